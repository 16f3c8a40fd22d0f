//! # Dependency Resolver
//!
//! Computes the Init order of an application's modules.
//!
//! An edge `A -> B` means A must be initialized before B. Edges come from:
//!
//! - **Explicit dependencies**: B lists A in `DependencyAware::dependencies`.
//! - **Service wiring**: B requires a service A declares it provides, either
//!   by name or, for interface-matched requirements whose name nobody
//!   provides, by an interface A's services satisfy.
//!
//! Optional requirements only add an edge when it does not close a cycle.
//!
//! Ordering is Kahn's algorithm with a stable tie-break: whenever several
//! modules are ready, the one registered first goes first. Two runs over the
//! same registrations always produce the same order.

use std::collections::{BTreeSet, HashMap};

use shared_types::{InterfaceSpec, ServiceDependency};
use tracing::debug;

use crate::errors::AppError;

/// A service a module needs before its Init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequirement {
    pub service: String,
    /// Providers of this interface satisfy the requirement when nobody
    /// provides `service` by name.
    pub interface: Option<InterfaceSpec>,
    pub optional: bool,
}

impl ServiceRequirement {
    pub fn named(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            interface: None,
            optional: false,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn or_interface(mut self, interface: InterfaceSpec) -> Self {
        self.interface = Some(interface);
        self
    }
}

impl From<&ServiceDependency> for ServiceRequirement {
    fn from(dependency: &ServiceDependency) -> Self {
        Self {
            service: dependency.name.clone(),
            interface: dependency
                .required_interface
                .filter(|_| dependency.match_by_interface),
            optional: dependency.optional,
        }
    }
}

/// What the resolver needs to know about one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleNode {
    pub name: String,
    /// Modules that must initialize first.
    pub dependencies: Vec<String>,
    /// Service names the module publishes.
    pub provides: Vec<String>,
    /// Interfaces the published services satisfy.
    pub interfaces: Vec<InterfaceSpec>,
    pub requires: Vec<ServiceRequirement>,
}

impl ModuleNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn depends_on<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(modules.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn provides<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides.extend(services.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn provides_interfaces<I>(mut self, interfaces: I) -> Self
    where
        I: IntoIterator<Item = InterfaceSpec>,
    {
        self.interfaces.extend(interfaces);
        self
    }

    /// Hard requirements on services by name.
    #[must_use]
    pub fn requires<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires
            .extend(services.into_iter().map(ServiceRequirement::named));
        self
    }

    #[must_use]
    pub fn requirements<I>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = ServiceRequirement>,
    {
        self.requires.extend(requirements);
        self
    }
}

/// Module graph in registration order.
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: Vec<ModuleNode>,
    successors: Vec<BTreeSet<usize>>,
    predecessors: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    /// Build the graph. Fails if a module depends on a module that is not
    /// part of `nodes`.
    pub fn new(nodes: Vec<ModuleNode>) -> Result<Self, AppError> {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.name.as_str(), idx))
            .collect();

        let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut by_interface: HashMap<InterfaceSpec, Vec<usize>> = HashMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            for service in &node.provides {
                by_name.entry(service.as_str()).or_default().push(idx);
            }
            for interface in &node.interfaces {
                by_interface.entry(*interface).or_default().push(idx);
            }
        }

        let mut edges: Vec<(usize, usize)> = Vec::new();
        let mut optional_edges: Vec<(usize, usize)> = Vec::new();
        for (idx, node) in nodes.iter().enumerate() {
            for dependency in &node.dependencies {
                let &from = index.get(dependency.as_str()).ok_or_else(|| {
                    AppError::MissingDependency {
                        module: node.name.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                edges.push((from, idx));
            }

            for requirement in &node.requires {
                let providers = match by_name.get(requirement.service.as_str()) {
                    Some(providers) => providers.as_slice(),
                    None => requirement
                        .interface
                        .as_ref()
                        .and_then(|interface| by_interface.get(interface))
                        .map_or(&[][..], Vec::as_slice),
                };
                let target = if requirement.optional {
                    &mut optional_edges
                } else {
                    &mut edges
                };
                // A module providing its own requirement needs no edge.
                target.extend(
                    providers
                        .iter()
                        .filter(|&&provider| provider != idx)
                        .map(|&provider| (provider, idx)),
                );
            }
        }

        let mut graph = Self {
            successors: vec![BTreeSet::new(); nodes.len()],
            predecessors: vec![BTreeSet::new(); nodes.len()],
            nodes,
        };
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        for (from, to) in optional_edges {
            if graph.successors[from].contains(&to) {
                continue;
            }
            if graph.reaches(to, from) {
                debug!(
                    provider = %graph.nodes[from].name,
                    consumer = %graph.nodes[to].name,
                    "Optional service edge would close a cycle, skipped"
                );
                continue;
            }
            graph.add_edge(from, to);
        }

        Ok(graph)
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        self.successors[from].insert(to);
        self.predecessors[to].insert(from);
    }

    /// Whether `to` can be reached from `from` along existing edges.
    fn reaches(&self, from: usize, to: usize) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if std::mem::replace(&mut visited[current], true) {
                continue;
            }
            stack.extend(self.successors[current].iter().copied());
        }
        false
    }

    /// Topological order of module names.
    pub fn resolve(&self) -> Result<Vec<String>, AppError> {
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(BTreeSet::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|&idx| in_degree[idx] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(idx) = ready.pop_first() {
            order.push(idx);
            for &next in &self.successors[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let remaining: BTreeSet<usize> = (0..self.nodes.len())
                .filter(|&idx| in_degree[idx] > 0)
                .collect();
            return Err(AppError::CircularDependency {
                modules: self.names(&self.find_cycle(&remaining)),
            });
        }

        Ok(self.names(&order))
    }

    /// Walk "depends on" links through the unresolved modules until one
    /// repeats. Every unresolved module has an unresolved predecessor, so
    /// the walk always closes a loop.
    fn find_cycle(&self, remaining: &BTreeSet<usize>) -> Vec<usize> {
        let Some(&start) = remaining.first() else {
            return Vec::new();
        };

        let mut path: Vec<usize> = Vec::new();
        let mut seen: HashMap<usize, usize> = HashMap::new();
        let mut current = start;

        loop {
            if let Some(&at) = seen.get(&current) {
                let mut cycle = path.split_off(at);
                if let Some(lowest) = cycle.iter().enumerate().min_by_key(|&(_, &n)| n).map(|(i, _)| i) {
                    cycle.rotate_left(lowest);
                }
                return cycle;
            }
            seen.insert(current, path.len());
            path.push(current);

            match self.predecessors[current]
                .iter()
                .find(|&&p| remaining.contains(&p))
            {
                Some(&previous) => current = previous,
                None => return remaining.iter().copied().collect(),
            }
        }
    }

    fn names(&self, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .map(|&idx| self.nodes[idx].name.clone())
            .collect()
    }
}

/// Build the graph and resolve it in one step.
pub fn resolve_order(nodes: Vec<ModuleNode>) -> Result<Vec<String>, AppError> {
    DependencyGraph::new(nodes)?.resolve()
}
