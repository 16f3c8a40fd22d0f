//! # Error Types
//!
//! Every failure the runtime reports. Module and observer callbacks return
//! `anyhow::Error`; the runtime attaches it as the `source` of the variant
//! naming the phase and module it came from.

use shared_types::{LifecycleState, TenantId};
use thiserror::Error;

/// Errors surfaced by the application runtime.
#[derive(Debug, Error)]
pub enum AppError {
    /// The module graph contains a cycle. Lists every module on it.
    #[error("Circular dependency: {}", format_cycle(.modules))]
    CircularDependency { modules: Vec<String> },

    /// A module depends on a module that is not registered (or is disabled).
    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    MissingDependency { module: String, dependency: String },

    /// A module name was registered twice.
    #[error("Module '{name}' is already registered")]
    DuplicateModule { name: String },

    /// A non-optional service was absent when the module came to initialize.
    #[error("Module '{module}' requires service '{service}' which is not registered")]
    RequiredServiceNotFound { module: String, service: String },

    /// Both `name` and `name.module` are taken.
    #[error("Service name '{name}' from module '{module}' conflicts and cannot be renamed")]
    ServiceNameConflictUnresolvable { name: String, module: String },

    #[error("Service '{name}' not found")]
    ServiceNotFound { name: String },

    /// The service exists but is not retrievable as the requested type.
    #[error("Service '{name}' is a {actual_type}, not retrievable as {want_type}")]
    ServiceTypeMismatch {
        name: String,
        want_type: &'static str,
        actual_type: &'static str,
    },

    #[error("Config section '{section}' not found{}", tenant_suffix(.tenant))]
    ConfigSectionNotFound {
        tenant: Option<TenantId>,
        section: String,
    },

    #[error("Config section '{section}'{} failed validation", tenant_suffix(.tenant))]
    ConfigValidationFailed {
        tenant: Option<TenantId>,
        section: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("Tenant '{tenant}' is not registered")]
    TenantNotFound { tenant: TenantId },

    #[error("Module '{module}' failed to initialize")]
    ModuleInitFailed {
        module: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("Module '{module}' failed to start")]
    ModuleStartFailed {
        module: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("Module '{module}' failed to stop")]
    ModuleStopFailed {
        module: String,
        #[source]
        cause: anyhow::Error,
    },

    /// One or more modules failed to stop. Each entry is a `ModuleStopFailed`.
    #[error("{} module(s) failed to stop: {}", .0.len(), join_modules(.0))]
    StopFailed(Vec<AppError>),

    /// A lifecycle operation was called in the wrong state.
    #[error("Cannot {operation} while application is {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },
}

impl AppError {
    /// The module a failure is attributed to, if any.
    #[must_use]
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::MissingDependency { module, .. }
            | Self::RequiredServiceNotFound { module, .. }
            | Self::ServiceNameConflictUnresolvable { module, .. }
            | Self::ModuleInitFailed { module, .. }
            | Self::ModuleStartFailed { module, .. }
            | Self::ModuleStopFailed { module, .. } => Some(module),
            _ => None,
        }
    }

    /// Modules named by this error: the cycle members, every failed stop,
    /// or the single attributed module.
    #[must_use]
    pub fn failed_modules(&self) -> Vec<&str> {
        match self {
            Self::CircularDependency { modules } => modules.iter().map(String::as_str).collect(),
            Self::StopFailed(failures) => failures.iter().filter_map(AppError::module).collect(),
            other => other.module().into_iter().collect(),
        }
    }
}

fn format_cycle(modules: &[String]) -> String {
    match modules.first() {
        Some(first) => format!("{} -> {}", modules.join(" -> "), first),
        None => String::new(),
    }
}

fn tenant_suffix(tenant: &Option<TenantId>) -> String {
    match tenant {
        Some(tenant) => format!(" for tenant '{tenant}'"),
        None => String::new(),
    }
}

fn join_modules(failures: &[AppError]) -> String {
    failures
        .iter()
        .filter_map(AppError::module)
        .collect::<Vec<_>>()
        .join(", ")
}
