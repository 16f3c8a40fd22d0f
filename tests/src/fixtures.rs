//! Shared test fixtures.
//!
//! [`TestModule`] is a module whose every capability is switchable, so a
//! suite can describe an application in a few lines:
//!
//! ```rust,ignore
//! let journal = Journal::default();
//! app.register_module(TestModule::new("api", &journal).after(["db"]).publishes("http", "api").arc())?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use modulith_runtime::{
    AppHandle, Context, DependencyAware, Event, Initializable, InterfaceSpec, Module, Observer, ServiceAware,
    ServiceDependency, ServiceInstance, Startable, Stoppable, TenantAware, TenantId,
};

/// Append-only record of calls, shared between fixtures and assertions.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Entries starting with `prefix`.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Interface published by [`TestModule`] services.
pub trait Labelled: Send + Sync {
    fn label(&self) -> String;
}

/// Second interface, implemented by nothing unless a test opts in.
pub trait Audited: Send + Sync {
    fn audit_trail(&self) -> Vec<String>;
}

pub struct LabelledService {
    label: String,
}

impl LabelledService {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Wrap as a service retrievable as `dyn Labelled`.
    pub fn instance(label: impl Into<String>) -> ServiceInstance {
        ServiceInstance::builder(Arc::new(Self::new(label)))
            .implements::<dyn Labelled>(|s| s)
            .build()
    }
}

impl Labelled for LabelledService {
    fn label(&self) -> String {
        self.label.clone()
    }
}

/// A module with switchable capabilities that journals every call as
/// `"<step>:<module>"`.
pub struct TestModule {
    name: String,
    journal: Journal,
    dependencies: Vec<String>,
    publishes: Vec<(String, String)>,
    requires: Vec<ServiceDependency>,
    fail_init: bool,
    fail_start: bool,
    fail_stop: bool,
    tenant_aware: bool,
}

impl TestModule {
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            dependencies: Vec::new(),
            publishes: Vec::new(),
            requires: Vec::new(),
            fail_init: false,
            fail_start: false,
            fail_stop: false,
            tenant_aware: false,
        }
    }

    pub fn after<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(modules.into_iter().map(Into::into));
        self
    }

    /// Register a `dyn Labelled` service named `service` during Init.
    pub fn publishes(mut self, service: impl Into<String>, label: impl Into<String>) -> Self {
        self.publishes.push((service.into(), label.into()));
        self
    }

    pub fn requires(mut self, dependency: ServiceDependency) -> Self {
        self.requires.push(dependency);
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Journal tenant callbacks as `"tenant:<module>:<tenant>"` and
    /// `"tenant-update:<module>:<tenant>:<section>"`.
    pub fn tenant_aware(mut self) -> Self {
        self.tenant_aware = true;
        self
    }

    pub fn arc(self) -> Arc<dyn Module> {
        Arc::new(self)
    }

    fn record(&self, step: &str) {
        self.journal.record(format!("{step}:{}", self.name));
    }
}

#[async_trait]
impl Initializable for TestModule {
    async fn init(&self, app: &AppHandle) -> anyhow::Result<()> {
        self.record("init");
        for (service, label) in &self.publishes {
            app.register_service(service, LabelledService::instance(label.clone()))?;
        }
        anyhow::ensure!(!self.fail_init, "{} refused to initialize", self.name);
        Ok(())
    }
}

#[async_trait]
impl Startable for TestModule {
    async fn start(&self, _ctx: &Context) -> anyhow::Result<()> {
        self.record("start");
        anyhow::ensure!(!self.fail_start, "{} refused to start", self.name);
        Ok(())
    }
}

#[async_trait]
impl Stoppable for TestModule {
    async fn stop(&self, _ctx: &Context) -> anyhow::Result<()> {
        self.record("stop");
        anyhow::ensure!(!self.fail_stop, "{} refused to stop", self.name);
        Ok(())
    }
}

impl DependencyAware for TestModule {
    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }
}

impl ServiceAware for TestModule {
    fn requires_services(&self) -> Vec<ServiceDependency> {
        self.requires.clone()
    }

    /// Services are registered from Init, so only their names are known up front.
    fn provided_service_names(&self) -> Vec<String> {
        self.publishes.iter().map(|(name, _)| name.clone()).collect()
    }

    fn provided_interfaces(&self) -> Vec<InterfaceSpec> {
        if self.publishes.is_empty() {
            Vec::new()
        } else {
            vec![InterfaceSpec::of::<dyn Labelled>()]
        }
    }
}

impl TenantAware for TestModule {
    fn on_tenant_registered(&self, tenant: &TenantId) {
        self.journal.record(format!("tenant:{}:{tenant}", self.name));
    }

    fn on_tenant_config_updated(&self, tenant: &TenantId, section: &str) {
        self.journal
            .record(format!("tenant-update:{}:{tenant}:{section}", self.name));
    }
}

impl Module for TestModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_initializable(&self) -> Option<&dyn Initializable> {
        Some(self)
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        Some(self)
    }

    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        Some(self)
    }

    fn as_dependency_aware(&self) -> Option<&dyn DependencyAware> {
        Some(self)
    }

    fn as_service_aware(&self) -> Option<&dyn ServiceAware> {
        Some(self)
    }

    fn as_tenant_aware(self: Arc<Self>) -> Option<Arc<dyn TenantAware>> {
        if self.tenant_aware {
            Some(self)
        } else {
            None
        }
    }
}

/// Observer that journals `"<observer>:<event type>"` and can be told to fail.
pub struct RecordingObserver {
    id: String,
    journal: Journal,
    fail: bool,
}

impl RecordingObserver {
    pub fn new(id: impl Into<String>, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            journal: journal.clone(),
            fail: false,
        })
    }

    pub fn failing(id: impl Into<String>, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            journal: journal.clone(),
            fail: true,
        })
    }
}

#[async_trait]
impl Observer for RecordingObserver {
    fn observer_id(&self) -> &str {
        &self.id
    }

    async fn on_event(&self, _ctx: &Context, event: &Event) -> anyhow::Result<()> {
        self.journal
            .record(format!("{}:{}", self.id, event.event_type()));
        anyhow::ensure!(!self.fail, "{} rejects every event", self.id);
        Ok(())
    }
}
