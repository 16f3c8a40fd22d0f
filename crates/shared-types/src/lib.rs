//! # Shared Types Crate
//!
//! Contracts that every participant of a Modulith application agrees on.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Types crossing module boundaries live here.
//! - **Capability-Typed Services**: A service instance carries the set of
//!   interfaces it was published under, so lookups never need reflection.
//! - **Immutable Context**: A [`Context`] is created per operation and never
//!   mutated; deriving a tenant-scoped context yields a new value.

pub mod config;
pub mod context;
pub mod lifecycle;
pub mod service;

pub use config::{ConfigProvider, ConfigValidator, StdConfigProvider};
pub use context::{Context, TenantId};
pub use lifecycle::LifecycleState;
pub use service::{
    InterfaceSpec, ServiceDependency, ServiceInstance, ServiceInstanceBuilder, ServiceProvided,
};
