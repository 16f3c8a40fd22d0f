//! # Modulith Runtime
//!
//! Composes independently written modules into one process.
//!
//! ## Components
//!
//! - [`module`]: capability traits a module opts into
//! - [`resolver`]: dependency graph and Init order
//! - [`application`]: the Init/Start/Stop orchestrator and [`AppHandle`]
//! - [`registry`]: services by name or by interface, with conflict renaming
//! - [`tenant`]: per-tenant configuration over global sections
//! - [`config`]: global sections and per-module enable flags
//!
//! ## Example
//!
//! ```rust,ignore
//! let app = Application::from_env();
//! app.register_config_section("cache", StdConfigProvider::new(CacheConfig { ttl: 300 }));
//! app.register_module(Arc::new(CacheModule::default()))?;
//! app.register_module(Arc::new(ApiModule::default()))?;
//! app.run().await?;
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod application;
pub mod config;
pub mod errors;
pub mod module;
pub mod registry;
pub mod resolver;
pub mod tenant;

pub use application::{AppHandle, Application, ModuleStatus, APPLICATION_SOURCE};
pub use config::{ConfigRegistry, ConfigSections, RuntimeConfig};
pub use errors::AppError;
pub use module::{
    DependencyAware, Initializable, Module, ServiceAware, Startable, Stoppable, TenantAware,
};
pub use registry::{ServiceEntry, ServiceMatch, ServiceRegistry};
pub use resolver::{resolve_order, DependencyGraph, ModuleNode, ServiceRequirement};
pub use tenant::{TenantChange, TenantService};

// Contracts modules are written against.
pub use shared_bus::{events, Event, EventFilter, EventSubject, NotifyReport, Observer, Subject};
pub use shared_types::{
    ConfigProvider, ConfigValidator, Context, InterfaceSpec, LifecycleState, ServiceDependency,
    ServiceInstance, ServiceProvided, StdConfigProvider, TenantId,
};
