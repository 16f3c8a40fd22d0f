//! # Modulith Demo
//!
//! Two small modules wired through the runtime:
//!
//! - `store`: publishes a key/value store as `dyn KeyValue`
//! - `greeter`: needs the store, reads per-tenant config, watches lifecycle events
//!
//! ```text
//! MODULITH_LOG_LEVEL=debug cargo run --bin modulith-demo
//! MODULITH_MODULE_GREETER=false cargo run --bin modulith-demo
//! ```
//!
//! Runs until Ctrl-C.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::info;

use modulith_runtime::{
    events, AppHandle, Application, ConfigSections, Context, DependencyAware, Event, EventFilter,
    Initializable, Module, Observer, ServiceAware, ServiceDependency, ServiceInstance,
    StdConfigProvider, Startable, Stoppable, TenantAware, TenantId,
};
use modulith_telemetry::{init_telemetry, TelemetryConfig};

/// Greeting settings, overridable per tenant.
#[derive(Debug, Clone)]
struct GreetingConfig {
    salutation: String,
}

trait KeyValue: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
}

#[derive(Default)]
struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl KeyValue for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }
}

/// Publishes the store.
struct StoreModule;

#[async_trait]
impl Initializable for StoreModule {
    async fn init(&self, app: &AppHandle) -> Result<()> {
        let instance = ServiceInstance::builder(Arc::new(MemoryStore::default()))
            .implements::<dyn KeyValue>(|store| store)
            .build();
        app.register_service("kv", instance)?;
        Ok(())
    }
}

impl Module for StoreModule {
    fn name(&self) -> &str {
        "store"
    }

    fn as_initializable(&self) -> Option<&dyn Initializable> {
        Some(self)
    }
}

/// Greets each registered tenant using its own salutation.
#[derive(Default)]
struct GreeterModule {
    app: Mutex<Option<AppHandle>>,
    tenants: Mutex<Vec<TenantId>>,
}

impl GreeterModule {
    fn handle(&self) -> Result<AppHandle> {
        self.app
            .lock()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("greeter used before init"))
    }
}

#[async_trait]
impl Initializable for GreeterModule {
    async fn init(&self, app: &AppHandle) -> Result<()> {
        *self.app.lock() = Some(app.clone());
        Ok(())
    }
}

#[async_trait]
impl Startable for GreeterModule {
    async fn start(&self, ctx: &Context) -> Result<()> {
        let app = self.handle()?;
        let store = app.get_service::<dyn KeyValue>("kv")?;
        let tenants = self.tenants.lock().clone();

        for tenant in tenants {
            let scoped = ctx.with_tenant(tenant.clone());
            let section = app.config_for(&scoped, "greeting")?;
            let salutation = section
                .typed::<GreetingConfig>()
                .map(|c| c.salutation.clone())
                .unwrap_or_default();

            store.put(tenant.as_str(), format!("{salutation}, {tenant}!"));
            info!(tenant = %tenant, greeting = ?store.get(tenant.as_str()), "Greeting prepared");
        }
        Ok(())
    }
}

#[async_trait]
impl Stoppable for GreeterModule {
    async fn stop(&self, _ctx: &Context) -> Result<()> {
        self.app.lock().take();
        Ok(())
    }
}

impl DependencyAware for GreeterModule {
    fn dependencies(&self) -> Vec<String> {
        vec!["store".to_string()]
    }
}

impl ServiceAware for GreeterModule {
    fn requires_services(&self) -> Vec<ServiceDependency> {
        vec![ServiceDependency::required("kv").with_interface::<dyn KeyValue>()]
    }
}

impl TenantAware for GreeterModule {
    fn on_tenant_registered(&self, tenant: &TenantId) {
        self.tenants.lock().push(tenant.clone());
    }

    fn on_tenant_config_updated(&self, tenant: &TenantId, section: &str) {
        info!(tenant = %tenant, section = %section, "Tenant config changed");
    }
}

#[async_trait]
impl Observer for GreeterModule {
    fn observer_id(&self) -> &str {
        "greeter"
    }

    async fn on_event(&self, _ctx: &Context, event: &Event) -> Result<()> {
        info!(event_type = %event.event_type(), source = %event.source(), "Observed");
        Ok(())
    }
}

impl Module for GreeterModule {
    fn name(&self) -> &str {
        "greeter"
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
        Some(self)
    }

    fn as_observer(self: Arc<Self>) -> Option<Arc<dyn Observer>> {
        Some(self)
    }

    fn observed_event_types(&self) -> EventFilter {
        EventFilter::types([events::MODULE_STARTED, events::APPLICATION_STARTED])
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env().with_service_name("modulith-demo"))?;

    let app = Application::from_env();
    app.register_config_section(
        "greeting",
        StdConfigProvider::new(GreetingConfig {
            salutation: "Hello".to_string(),
        }),
    );

    let ctx = Context::new();
    let handle = app.handle();
    handle
        .register_tenant(
            &ctx,
            "acme",
            ConfigSections::new().section(
                "greeting",
                StdConfigProvider::new(GreetingConfig {
                    salutation: "Howdy".to_string(),
                }),
            ),
        )
        .await?;
    handle.register_tenant(&ctx, "globex", ConfigSections::new()).await?;

    app.register_module(Arc::new(GreeterModule::default()))?;
    app.register_module(Arc::new(StoreModule))?;

    info!("Press Ctrl+C to stop.");
    let result = app.run().await;
    app.log_status();
    result?;

    Ok(())
}
