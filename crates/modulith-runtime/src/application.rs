//! # Application
//!
//! Owns the modules of one process and drives them through their lifecycle.
//!
//! ```text
//!  register_module ──► init ──────────────► start ──────────► stop
//!                       │ validate config     │ same order      │ reverse order
//!                       │ resolve order       │ abort on error  │ best effort
//!                       │ Init each module    │                 │ aggregate errors
//!                       │ publish services    │                 │
//!                       ▼                     ▼                 ▼
//!                  Initialized             Running           Stopped
//! ```
//!
//! Phases are serialized by one async lock: a second `start` issued while
//! `init` is running waits for it, then is checked against the new state.
//!
//! Every application has its own service registry, configuration, tenant
//! overlay and event subject; several applications can share a process.

use std::any::type_name;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_bus::events::{
    APPLICATION_STARTED, APPLICATION_STOPPED, MODULE_FAILED, MODULE_INITIALIZED, MODULE_STARTED,
    MODULE_STOPPED, SERVICE_REGISTERED, TENANT_CONFIG_UPDATED, TENANT_REGISTERED,
};
use shared_bus::{Event, EventFilter, EventSubject, NotifyReport, Observer, Subject};
use shared_types::{ConfigProvider, Context, LifecycleState, ServiceInstance, TenantId};
use tracing::{debug, error, info, warn, Instrument};

use crate::config::{ConfigRegistry, ConfigSections, RuntimeConfig};
use crate::errors::AppError;
use crate::module::Module;
use crate::registry::{ServiceMatch, ServiceRegistry};
use crate::resolver::{resolve_order, ModuleNode, ServiceRequirement};
use crate::tenant::{TenantChange, TenantService};
use modulith_telemetry::{log_module_event, module_span};

/// Event source used for application-level events.
pub const APPLICATION_SOURCE: &str = "application";

/// Lifecycle status of a single module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Registered, Init not run yet.
    Registered,
    /// Switched off by [`RuntimeConfig`]; never initialized.
    Disabled,
    Initialized,
    Running,
    Stopped,
    /// Init, Start or Stop returned an error.
    Failed,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State shared by the application and every handle it gives out.
struct AppCore {
    services: ServiceRegistry,
    config: Arc<ConfigRegistry>,
    tenants: TenantService,
    subject: Arc<EventSubject>,
}

impl AppCore {
    fn new() -> Self {
        let config = Arc::new(ConfigRegistry::new());
        Self {
            services: ServiceRegistry::new(),
            tenants: TenantService::new(Arc::clone(&config)),
            config,
            subject: Arc::new(EventSubject::new()),
        }
    }

    async fn publish(&self, ctx: &Context, event_type: &str, source: &str, data: Value) -> NotifyReport {
        self.subject
            .notify_observers(ctx, Event::new(event_type, source, data))
            .await
    }
}

/// A module's view of the application.
///
/// Handed to [`Initializable::init`](crate::module::Initializable::init).
/// Cheap to clone; modules may keep it for use after Init. Services
/// registered through a handle are attributed to the handle's module.
#[derive(Clone)]
pub struct AppHandle {
    core: Arc<AppCore>,
    module_name: Arc<str>,
    module_type: &'static str,
}

impl AppHandle {
    fn for_module(core: Arc<AppCore>, module: &dyn Module) -> Self {
        Self {
            core,
            module_name: Arc::from(module.name()),
            module_type: module.module_type(),
        }
    }

    /// Name of the module this handle acts for.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    // -------------------------------------------------------------------------
    // Services
    // -------------------------------------------------------------------------

    /// Register a service under this module. Returns the name it was stored
    /// under, which differs from `name` when another module already owns it.
    ///
    /// Services registered during Init are announced with a
    /// `com.modulith.service.registered` event once Init returns.
    pub fn register_service(&self, name: &str, instance: ServiceInstance) -> Result<String, AppError> {
        self.core
            .services
            .register_service(name, &self.module_name, self.module_type, instance)
    }

    pub fn get_service<T>(&self, name: &str) -> Result<Arc<T>, AppError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.core.services.get_service::<T>(name)
    }

    #[must_use]
    pub fn get_services_by_interface<I>(&self) -> Vec<ServiceMatch<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.core.services.get_services_by_interface::<I>()
    }

    #[must_use]
    pub fn services(&self) -> &ServiceRegistry {
        &self.core.services
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    pub fn get_config_section(&self, name: &str) -> Result<Arc<dyn ConfigProvider>, AppError> {
        self.core.config.get_config_section(name)
    }

    pub fn register_config_section(&self, name: impl Into<String>, provider: impl ConfigProvider + 'static) {
        self.core
            .config
            .register_config_section(name, Arc::new(provider));
    }

    pub fn tenant_config(&self, tenant: &TenantId, section: &str) -> Result<Arc<dyn ConfigProvider>, AppError> {
        self.core.tenants.get_tenant_config(tenant, section)
    }

    /// Resolve `section` for the tenant carried by `ctx`, or globally when
    /// `ctx` has no tenant.
    pub fn config_for(&self, ctx: &Context, section: &str) -> Result<Arc<dyn ConfigProvider>, AppError> {
        match ctx.tenant() {
            Some(tenant) => self.core.tenants.get_tenant_config(tenant, section),
            None => self.core.config.get_config_section(section),
        }
    }

    // -------------------------------------------------------------------------
    // Tenants
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn tenants(&self) -> &TenantService {
        &self.core.tenants
    }

    /// Register a tenant (or merge into an existing one) and announce it.
    pub async fn register_tenant(
        &self,
        ctx: &Context,
        tenant: impl Into<TenantId>,
        sections: ConfigSections,
    ) -> Result<TenantChange, AppError> {
        let tenant = tenant.into();
        let change = self.core.tenants.register_tenant(tenant.clone(), sections)?;

        let (event_type, sections) = match &change {
            TenantChange::Registered => (
                TENANT_REGISTERED,
                self.core.tenants.tenant_sections(&tenant).unwrap_or_default(),
            ),
            TenantChange::Updated { sections } => (TENANT_CONFIG_UPDATED, sections.clone()),
        };
        self.core
            .publish(
                ctx,
                event_type,
                &self.module_name,
                json!({ "tenant": tenant, "sections": sections }),
            )
            .await;

        Ok(change)
    }

    /// Replace one section of a registered tenant and announce it.
    pub async fn update_tenant_config(
        &self,
        ctx: &Context,
        tenant: &TenantId,
        section: &str,
        provider: impl ConfigProvider + 'static,
    ) -> Result<(), AppError> {
        self.core
            .tenants
            .update_tenant_config(tenant, section, Arc::new(provider))?;

        self.core
            .publish(
                ctx,
                TENANT_CONFIG_UPDATED,
                &self.module_name,
                json!({ "tenant": tenant, "sections": [section] }),
            )
            .await;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn subject(&self) -> &Arc<EventSubject> {
        &self.core.subject
    }

    pub fn register_observer(&self, observer: Arc<dyn Observer>, filter: EventFilter) {
        self.core.subject.register_observer(observer, filter);
    }

    /// Emit an event with this module as its source.
    pub async fn emit(&self, ctx: &Context, event_type: &str, data: Value) -> NotifyReport {
        self.core
            .publish(ctx, event_type, &self.module_name, data)
            .await
    }
}

/// Modules past Init, in Init order. Only touched under the phase lock.
#[derive(Default)]
struct PhaseState {
    initialized: Vec<Arc<dyn Module>>,
}

/// A composed application.
pub struct Application {
    core: Arc<AppCore>,
    runtime_config: RuntimeConfig,
    modules: RwLock<Vec<Arc<dyn Module>>>,
    /// Every registered module, disabled ones included, in registration order.
    status: RwLock<Vec<(String, ModuleStatus)>>,
    order: RwLock<Vec<String>>,
    state: RwLock<LifecycleState>,
    phase: tokio::sync::Mutex<PhaseState>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    /// An application with every module enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// An application whose enabled modules come from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_config(RuntimeConfig::from_env())
    }

    #[must_use]
    pub fn with_config(runtime_config: RuntimeConfig) -> Self {
        Self {
            core: Arc::new(AppCore::new()),
            runtime_config,
            modules: RwLock::new(Vec::new()),
            status: RwLock::new(Vec::new()),
            order: RwLock::new(Vec::new()),
            state: RwLock::new(LifecycleState::Created),
            phase: tokio::sync::Mutex::new(PhaseState::default()),
        }
    }

    /// Add a module. Only allowed before `init`.
    ///
    /// A module disabled by the runtime configuration is recorded as
    /// [`ModuleStatus::Disabled`] and otherwise ignored.
    pub fn register_module(&self, module: Arc<dyn Module>) -> Result<(), AppError> {
        // Held until the module is recorded, so `init` cannot start in between.
        let state = self.state.read();
        if *state != LifecycleState::Created {
            return Err(AppError::InvalidState {
                operation: "register module",
                state: *state,
            });
        }

        let name = module.name().to_string();
        let mut status = self.status.write();
        if status.iter().any(|(existing, _)| *existing == name) {
            return Err(AppError::DuplicateModule { name });
        }

        if !self.runtime_config.is_enabled(&name) {
            log_module_event!(info, name, "Skipping disabled module");
            status.push((name, ModuleStatus::Disabled));
            return Ok(());
        }

        log_module_event!(info, name, "Registering module", module_type = module.module_type());
        status.push((name, ModuleStatus::Registered));
        self.modules.write().push(module);
        Ok(())
    }

    /// Add or replace a global configuration section.
    pub fn register_config_section(&self, name: impl Into<String>, provider: impl ConfigProvider + 'static) {
        self.core
            .config
            .register_config_section(name, Arc::new(provider));
    }

    /// A handle acting on behalf of the application itself.
    #[must_use]
    pub fn handle(&self) -> AppHandle {
        AppHandle {
            core: Arc::clone(&self.core),
            module_name: Arc::from(APPLICATION_SOURCE),
            module_type: type_name::<Self>(),
        }
    }

    #[must_use]
    pub fn services(&self) -> &ServiceRegistry {
        &self.core.services
    }

    #[must_use]
    pub fn subject(&self) -> &Arc<EventSubject> {
        &self.core.subject
    }

    #[must_use]
    pub fn tenants(&self) -> &TenantService {
        &self.core.tenants
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    #[must_use]
    pub fn module_status(&self, name: &str) -> Option<ModuleStatus> {
        self.status
            .read()
            .iter()
            .find(|(module, _)| module == name)
            .map(|(_, status)| *status)
    }

    #[must_use]
    pub fn module_statuses(&self) -> Vec<(String, ModuleStatus)> {
        self.status.read().clone()
    }

    /// Init order computed by the last `init`. Empty before that.
    #[must_use]
    pub fn init_order(&self) -> Vec<String> {
        self.order.read().clone()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Validate configuration, resolve the module order and run Init.
    ///
    /// Stops at the first failure; the application is then `Failed` and
    /// only accepts `stop`, which tears down the modules that did initialize.
    pub async fn init(&self) -> Result<(), AppError> {
        let mut phase = self.phase.lock().await;
        self.advance(LifecycleState::Initializing, "initialize")?;
        info!(modules = self.modules.read().len(), "Initializing application");

        let ctx = Context::new();
        match self.init_modules(&ctx, &mut phase).await {
            Ok(()) => {
                self.advance(LifecycleState::Initialized, "initialize")?;
                info!(modules = phase.initialized.len(), "Application initialized");
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    async fn init_modules(&self, ctx: &Context, phase: &mut PhaseState) -> Result<(), AppError> {
        self.core.config.validate_all()?;

        let modules = self.modules.read().clone();
        let order = resolve_order(modules.iter().map(|m| module_node(m.as_ref())).collect())?;
        info!(order = ?order, "Module init order resolved");
        *self.order.write() = order.clone();

        let by_name: HashMap<&str, &Arc<dyn Module>> =
            modules.iter().map(|m| (m.name(), m)).collect();

        for name in &order {
            if let Some(&module) = by_name.get(name.as_str()) {
                self.init_module(ctx, phase, module).await?;
            }
        }
        Ok(())
    }

    async fn init_module(
        &self,
        ctx: &Context,
        phase: &mut PhaseState,
        module: &Arc<dyn Module>,
    ) -> Result<(), AppError> {
        let name = module.name();

        if let Some(aware) = module.as_service_aware() {
            let own: HashSet<String> = aware.provided_service_names().into_iter().collect();
            for dependency in aware.requires_services() {
                // The module publishes this one itself once Init succeeds.
                if own.contains(&dependency.name)
                    && self.core.services.get_service_entry(&dependency.name).is_none()
                {
                    continue;
                }
                match self.core.services.resolve_dependency(name, &dependency) {
                    Ok(Some(entry)) => debug!(
                        module = %name,
                        service = %dependency.name,
                        resolved = %entry.actual_name,
                        "Required service resolved"
                    ),
                    Ok(None) => {}
                    Err(err) => return Err(self.module_failed(ctx, name, "init", err).await),
                }
            }
        }

        let existing: HashSet<String> = self
            .core
            .services
            .get_services_by_module(name)
            .into_iter()
            .collect();
        let handle = AppHandle::for_module(Arc::clone(&self.core), module.as_ref());

        if let Some(initializable) = module.as_initializable() {
            log_module_event!(info, name, "Initializing module");
            if let Err(cause) = initializable
                .init(&handle)
                .instrument(module_span!("module.init", module = %name))
                .await
            {
                let err = AppError::ModuleInitFailed {
                    module: name.to_string(),
                    cause,
                };
                return Err(self.module_failed(ctx, name, "init", err).await);
            }
        }
        phase.initialized.push(Arc::clone(module));

        if let Some(aware) = module.as_service_aware() {
            for provided in aware.provides_services() {
                if let Err(err) = handle.register_service(&provided.name, provided.instance) {
                    return Err(self.module_failed(ctx, name, "init", err).await);
                }
            }
        }

        if let Some(listener) = Arc::clone(module).as_tenant_aware() {
            self.core.tenants.register_tenant_aware(listener);
        }
        if let Some(observer) = Arc::clone(module).as_observer() {
            self.core
                .subject
                .register_observer(observer, module.observed_event_types());
        }

        self.set_status(name, ModuleStatus::Initialized);
        log_module_event!(info, name, "Module initialized");

        for actual_name in self.core.services.get_services_by_module(name) {
            if existing.contains(&actual_name) {
                continue;
            }
            if let Some(entry) = self.core.services.get_service_entry(&actual_name) {
                let data = json!({
                    "name": entry.actual_name,
                    "original_name": entry.original_name,
                    "module": entry.module_name,
                    "module_type": entry.module_type,
                    "interfaces": entry.instance.interfaces(),
                });
                self.core.publish(ctx, SERVICE_REGISTERED, name, data).await;
            }
        }
        self.core
            .publish(ctx, MODULE_INITIALIZED, name, json!({ "module": name }))
            .await;
        Ok(())
    }

    /// Run Start on every initialized module, in Init order.
    pub async fn start(&self, ctx: &Context) -> Result<(), AppError> {
        let phase = self.phase.lock().await;
        self.advance(LifecycleState::Starting, "start")?;
        info!(modules = phase.initialized.len(), "Starting application");

        for module in &phase.initialized {
            let name = module.name();
            if let Some(startable) = module.as_startable() {
                log_module_event!(info, name, "Starting module");
                if let Err(cause) = startable
                    .start(ctx)
                    .instrument(module_span!("module.start", module = %name))
                    .await
                {
                    let err = AppError::ModuleStartFailed {
                        module: name.to_string(),
                        cause,
                    };
                    let err = self.module_failed(ctx, name, "start", err).await;
                    self.fail(&err);
                    return Err(err);
                }
            }
            self.set_status(name, ModuleStatus::Running);
            self.core
                .publish(ctx, MODULE_STARTED, name, json!({ "module": name }))
                .await;
        }

        self.advance(LifecycleState::Running, "start")?;
        info!("Application running");
        self.core
            .publish(
                ctx,
                APPLICATION_STARTED,
                APPLICATION_SOURCE,
                json!({ "modules": phase.initialized.len() }),
            )
            .await;
        Ok(())
    }

    /// Run Stop on every initialized module, in reverse Init order.
    ///
    /// Every module gets its Stop call even when an earlier one fails; the
    /// failures are returned together as [`AppError::StopFailed`].
    pub async fn stop(&self, ctx: &Context) -> Result<(), AppError> {
        let mut phase = self.phase.lock().await;
        self.advance(LifecycleState::Stopping, "stop")?;
        info!(modules = phase.initialized.len(), "Stopping application");

        let mut failures = Vec::new();
        for module in phase.initialized.iter().rev() {
            let name = module.name();
            if let Some(stoppable) = module.as_stoppable() {
                log_module_event!(info, name, "Stopping module");
                if let Err(cause) = stoppable.stop(ctx).await {
                    let err = AppError::ModuleStopFailed {
                        module: name.to_string(),
                        cause,
                    };
                    failures.push(self.module_failed(ctx, name, "stop", err).await);
                    continue;
                }
            }
            self.set_status(name, ModuleStatus::Stopped);
            self.core
                .publish(ctx, MODULE_STOPPED, name, json!({ "module": name }))
                .await;
        }
        phase.initialized.clear();

        self.advance(LifecycleState::Stopped, "stop")?;
        self.core
            .publish(
                ctx,
                APPLICATION_STOPPED,
                APPLICATION_SOURCE,
                json!({ "failures": failures.len() }),
            )
            .await;

        if failures.is_empty() {
            info!("Application stopped");
            Ok(())
        } else {
            warn!(failed = failures.len(), "Application stopped with errors");
            Err(AppError::StopFailed(failures))
        }
    }

    /// Init, start, wait for `shutdown` or cancellation of `ctx`, then stop.
    ///
    /// If Init or Start fails, the modules that did initialize are stopped
    /// and the original error is returned.
    pub async fn run_until<F>(&self, ctx: &Context, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        if let Err(err) = self.init().await {
            self.stop_after_failure(ctx).await;
            return Err(err);
        }
        if let Err(err) = self.start(ctx).await {
            self.stop_after_failure(ctx).await;
            return Err(err);
        }

        tokio::select! {
            () = shutdown => info!("Shutdown requested"),
            () = ctx.cancelled() => info!("Context cancelled, shutting down"),
        }

        self.stop(ctx).await
    }

    /// [`run_until`](Self::run_until) Ctrl-C.
    pub async fn run(&self) -> Result<(), AppError> {
        let ctx = Context::new();
        self.run_until(&ctx, ctrl_c()).await
    }

    async fn stop_after_failure(&self, ctx: &Context) {
        if self.state() != LifecycleState::Failed {
            return;
        }
        if let Err(err) = self.stop(ctx).await {
            warn!(error = %err, "Cleanup after failed startup reported errors");
        }
    }

    /// Log a status table of every registered module.
    pub fn log_status(&self) {
        info!("===========================================");
        info!("  MODULE STATUS ({})", self.state());
        info!("===========================================");

        for (name, status) in self.status.read().iter() {
            let icon = match status {
                ModuleStatus::Running => "✅",
                ModuleStatus::Disabled => "⏸️ ",
                ModuleStatus::Failed => "❌",
                ModuleStatus::Stopped => "⏹️ ",
                ModuleStatus::Registered | ModuleStatus::Initialized => "⏳",
            };
            info!("  {} {:30} {}", icon, name, status);
        }

        info!("===========================================");
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn advance(&self, next: LifecycleState, operation: &'static str) -> Result<(), AppError> {
        let mut state = self.state.write();
        let current = *state;
        if !current.can_transition_to(next) {
            return Err(AppError::InvalidState {
                operation,
                state: current,
            });
        }
        debug!(from = %current, to = %next, "Application state changed");
        *state = next;
        Ok(())
    }

    fn fail(&self, err: &AppError) {
        *self.state.write() = LifecycleState::Failed;
        error!(error = %err, modules = ?err.failed_modules(), "Application lifecycle failed");
    }

    fn set_status(&self, name: &str, next: ModuleStatus) {
        if let Some((_, status)) = self
            .status
            .write()
            .iter_mut()
            .find(|(module, _)| module == name)
        {
            *status = next;
        }
    }

    /// Record a module failure and announce it. Returns `err` for propagation.
    async fn module_failed(&self, ctx: &Context, name: &str, phase: &str, err: AppError) -> AppError {
        self.set_status(name, ModuleStatus::Failed);
        let cause = std::error::Error::source(&err)
            .map(ToString::to_string)
            .unwrap_or_else(|| err.to_string());
        log_module_event!(warn, name, "Module failed", phase = %phase, error = %cause);

        self.core
            .publish(
                ctx,
                MODULE_FAILED,
                name,
                json!({ "module": name, "phase": phase, "error": cause }),
            )
            .await;
        err
    }
}

fn module_node(module: &dyn Module) -> ModuleNode {
    let mut node = ModuleNode::new(module.name());
    if let Some(aware) = module.as_dependency_aware() {
        node = node.depends_on(aware.dependencies());
    }
    if let Some(aware) = module.as_service_aware() {
        node = node
            .provides(aware.provided_service_names())
            .provides_interfaces(aware.provided_interfaces())
            .requirements(aware.requires_services().iter().map(ServiceRequirement::from));
    }
    node
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Unable to listen for Ctrl-C, waiting for cancellation instead");
        std::future::pending::<()>().await;
    }
}
