//! # Module Capabilities
//!
//! A module is anything with a name. Everything else is optional and is
//! discovered through the `as_*` accessors on [`Module`]: a module opts into
//! a capability by implementing the capability trait and overriding the
//! matching accessor to return `Some(self)`.
//!
//! ```rust,ignore
//! struct Cache { /* ... */ }
//!
//! impl Module for Cache {
//!     fn name(&self) -> &str { "cache" }
//!     fn as_initializable(&self) -> Option<&dyn Initializable> { Some(self) }
//!     fn as_stoppable(&self) -> Option<&dyn Stoppable> { Some(self) }
//! }
//! ```
//!
//! | Capability | Consumed by |
//! |------------|-------------|
//! | [`Initializable`] | Orchestrator, Init phase |
//! | [`Startable`] | Orchestrator, Start phase |
//! | [`Stoppable`] | Orchestrator, Stop phase |
//! | [`DependencyAware`] | Resolver |
//! | [`ServiceAware`] | Resolver, service registry |
//! | [`TenantAware`] | Tenant overlay |
//! | [`Observer`] | Application subject |

use std::sync::Arc;

use async_trait::async_trait;
use shared_bus::{EventFilter, Observer};
use shared_types::{Context, InterfaceSpec, ServiceDependency, ServiceProvided, TenantId};

use crate::application::AppHandle;

/// Runs once, in dependency order, before any module starts.
#[async_trait]
pub trait Initializable: Send + Sync {
    /// Set the module up. Services registered through `app` are visible to
    /// every module initialized afterwards.
    async fn init(&self, app: &AppHandle) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Startable: Send + Sync {
    async fn start(&self, ctx: &Context) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Stoppable: Send + Sync {
    async fn stop(&self, ctx: &Context) -> anyhow::Result<()>;
}

/// Declares modules that must be initialized before this one.
pub trait DependencyAware: Send + Sync {
    fn dependencies(&self) -> Vec<String>;
}

/// Declares the services a module publishes and the services it needs.
pub trait ServiceAware: Send + Sync {
    /// Services to register under this module once its Init has succeeded.
    fn provides_services(&self) -> Vec<ServiceProvided> {
        Vec::new()
    }

    /// Services that must be in the registry before this module initializes.
    fn requires_services(&self) -> Vec<ServiceDependency> {
        Vec::new()
    }

    /// Names of the services from [`provides_services`](Self::provides_services),
    /// consulted before Init to order providers ahead of their consumers.
    ///
    /// Override when building the instances only makes sense after Init.
    fn provided_service_names(&self) -> Vec<String> {
        self.provides_services()
            .into_iter()
            .map(|provided| provided.name)
            .collect()
    }

    /// Interfaces the provided services can be retrieved as, used to order
    /// providers ahead of consumers that match by interface.
    ///
    /// Override together with [`provided_service_names`](Self::provided_service_names).
    fn provided_interfaces(&self) -> Vec<InterfaceSpec> {
        let mut interfaces: Vec<InterfaceSpec> = Vec::new();
        for provided in self.provides_services() {
            for interface in provided.instance.interface_specs() {
                if !interfaces.contains(interface) {
                    interfaces.push(*interface);
                }
            }
        }
        interfaces
    }
}

/// Receives tenant overlay changes.
///
/// Callbacks run on the caller of the tenant operation, after the overlay
/// lock has been released.
pub trait TenantAware: Send + Sync {
    fn on_tenant_registered(&self, tenant: &TenantId);

    fn on_tenant_config_updated(&self, tenant: &TenantId, section: &str);
}

/// Base contract for every module.
pub trait Module: Send + Sync + 'static {
    /// Unique module name.
    fn name(&self) -> &str;

    /// Type name recorded on the services this module registers.
    fn module_type(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn as_initializable(&self) -> Option<&dyn Initializable> {
        None
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        None
    }

    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        None
    }

    fn as_dependency_aware(&self) -> Option<&dyn DependencyAware> {
        None
    }

    fn as_service_aware(&self) -> Option<&dyn ServiceAware> {
        None
    }

    /// Tenant listeners outlive the Init call, so the accessor hands out an `Arc`.
    fn as_tenant_aware(self: Arc<Self>) -> Option<Arc<dyn TenantAware>> {
        None
    }

    fn as_observer(self: Arc<Self>) -> Option<Arc<dyn Observer>> {
        None
    }

    /// Event types delivered to an observer module. Defaults to all.
    fn observed_event_types(&self) -> EventFilter {
        EventFilter::all()
    }
}
