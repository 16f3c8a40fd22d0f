//! # Service Registry
//!
//! Maps service names to instances for one application. Names are unique;
//! when a second module publishes a name that is already taken, the service
//! is stored as `name.module` instead:
//!
//! ```text
//! register("cache", module "redis")   -> "cache"
//! register("cache", module "memory")  -> "cache.memory"
//! register("cache", module "memory")  -> "cache.memory"   (same module: replaced)
//! register("cache", module "other")   -> "cache.other"
//! ```
//!
//! Renaming goes one level deep. If `name.module` is also taken by a
//! different registration the call fails with
//! [`AppError::ServiceNameConflictUnresolvable`].
//!
//! The registry emits no events; the orchestrator announces registrations.

use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::{ServiceDependency, ServiceInstance};
use tracing::debug;

use crate::errors::AppError;
use modulith_telemetry::log_service_event;

/// A registered service and where it came from.
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    /// Name the module asked for.
    pub original_name: String,
    /// Name the service is stored under. Unique within the registry.
    pub actual_name: String,
    pub module_name: String,
    pub module_type: String,
    pub instance: Arc<ServiceInstance>,
}

impl ServiceEntry {
    /// Whether the service was stored under a derived name.
    #[must_use]
    pub fn is_renamed(&self) -> bool {
        self.original_name != self.actual_name
    }
}

/// One result of an interface lookup.
pub struct ServiceMatch<I: ?Sized> {
    pub entry: ServiceEntry,
    pub service: Arc<I>,
}

#[derive(Default)]
struct RegistryState {
    /// Entries in registration order.
    entries: Vec<ServiceEntry>,
    /// `actual_name` -> position in `entries`.
    by_name: HashMap<String, usize>,
}

impl RegistryState {
    fn entry(&self, actual_name: &str) -> Option<&ServiceEntry> {
        self.by_name.get(actual_name).map(|&idx| &self.entries[idx])
    }

    fn replace(&mut self, actual_name: &str, instance: ServiceInstance, module_type: &str) {
        if let Some(&idx) = self.by_name.get(actual_name) {
            let entry = &mut self.entries[idx];
            entry.instance = Arc::new(instance);
            entry.module_type = module_type.to_string();
        }
    }

    fn push(&mut self, entry: ServiceEntry) {
        self.by_name
            .insert(entry.actual_name.clone(), self.entries.len());
        self.entries.push(entry);
    }
}

/// Registry of every service published by an application's modules.
#[derive(Default)]
pub struct ServiceRegistry {
    state: RwLock<RegistryState>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance` under `name` for `module_name`.
    ///
    /// Returns the name the service was actually stored under.
    pub fn register_service(
        &self,
        name: &str,
        module_name: &str,
        module_type: &str,
        instance: ServiceInstance,
    ) -> Result<String, AppError> {
        let mut state = self.state.write();

        let owner = state.entry(name).map(|e| e.module_name.clone());
        let actual_name = match owner {
            None => name.to_string(),
            Some(owner) if owner == module_name => {
                log_service_event!(
                    warn,
                    module_name,
                    name,
                    "Module registered the same service name twice, replacing previous instance"
                );
                state.replace(name, instance, module_type);
                return Ok(name.to_string());
            }
            Some(owner) => {
                let renamed = format!("{name}.{module_name}");
                let held_by_self = state
                    .entry(&renamed)
                    .map(|e| e.module_name == module_name && e.original_name == name);
                match held_by_self {
                    None => {
                        log_service_event!(
                            warn,
                            module_name,
                            renamed,
                            "Service name already taken, registered under module-qualified name",
                            original = %name,
                            owner = %owner
                        );
                        renamed
                    }
                    Some(true) => {
                        log_service_event!(
                            warn,
                            module_name,
                            renamed,
                            "Module registered the same service name twice, replacing previous instance"
                        );
                        state.replace(&renamed, instance, module_type);
                        return Ok(renamed);
                    }
                    Some(false) => {
                        return Err(AppError::ServiceNameConflictUnresolvable {
                            name: name.to_string(),
                            module: module_name.to_string(),
                        });
                    }
                }
            }
        };

        state.push(ServiceEntry {
            original_name: name.to_string(),
            actual_name: actual_name.clone(),
            module_name: module_name.to_string(),
            module_type: module_type.to_string(),
            instance: Arc::new(instance),
        });

        log_service_event!(debug, module_name, actual_name, "Service registered");
        Ok(actual_name)
    }

    /// Look a service up by its actual name and retrieve it as `T`.
    pub fn get_service<T>(&self, name: &str) -> Result<Arc<T>, AppError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let instance = self
            .state
            .read()
            .entry(name)
            .map(|e| Arc::clone(&e.instance))
            .ok_or_else(|| AppError::ServiceNotFound {
                name: name.to_string(),
            })?;

        instance
            .get::<T>()
            .ok_or_else(|| AppError::ServiceTypeMismatch {
                name: name.to_string(),
                want_type: type_name::<T>(),
                actual_type: instance.type_name(),
            })
    }

    /// Every service retrievable as `I`, in registration order.
    #[must_use]
    pub fn get_services_by_interface<I>(&self) -> Vec<ServiceMatch<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let matches: Vec<ServiceMatch<I>> = self
            .state
            .read()
            .entries
            .iter()
            .filter_map(|entry| {
                entry.instance.get::<I>().map(|service| ServiceMatch {
                    entry: entry.clone(),
                    service,
                })
            })
            .collect();

        debug!(interface = type_name::<I>(), found = matches.len(), "Interface lookup");
        matches
    }

    /// Actual names of every service registered by `module_name`.
    #[must_use]
    pub fn get_services_by_module(&self, module_name: &str) -> Vec<String> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| e.module_name == module_name)
            .map(|e| e.actual_name.clone())
            .collect()
    }

    #[must_use]
    pub fn get_service_entry(&self, actual_name: &str) -> Option<ServiceEntry> {
        self.state.read().entry(actual_name).cloned()
    }

    /// Resolve a dependency declared by `module`.
    ///
    /// A registered name wins. Otherwise, if the dependency allows it, the
    /// first service implementing the required interface is used. Returns
    /// `Ok(None)` only for optional dependencies that could not be met.
    pub fn resolve_dependency(
        &self,
        module: &str,
        dependency: &ServiceDependency,
    ) -> Result<Option<ServiceEntry>, AppError> {
        let state = self.state.read();

        if let Some(entry) = state.entry(&dependency.name) {
            if let Some(interface) = &dependency.required_interface {
                if !entry.instance.satisfies(interface) {
                    return Err(AppError::ServiceTypeMismatch {
                        name: dependency.name.clone(),
                        want_type: interface.type_name(),
                        actual_type: entry.instance.type_name(),
                    });
                }
            }
            return Ok(Some(entry.clone()));
        }

        if dependency.match_by_interface {
            if let Some(interface) = &dependency.required_interface {
                if let Some(entry) = state.entries.iter().find(|e| e.instance.satisfies(interface)) {
                    debug!(
                        module = %module,
                        wanted = %dependency.name,
                        resolved = %entry.actual_name,
                        "Dependency matched by interface"
                    );
                    return Ok(Some(entry.clone()));
                }
            }
        }

        if dependency.optional {
            debug!(module = %module, service = %dependency.name, "Optional service not available");
            return Ok(None);
        }

        Err(AppError::RequiredServiceNotFound {
            module: module.to_string(),
            service: dependency.name.clone(),
        })
    }

    /// Actual names in registration order.
    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        self.state
            .read()
            .entries
            .iter()
            .map(|e| e.actual_name.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}
