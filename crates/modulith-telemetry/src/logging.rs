//! Structured logging setup.
//!
//! Logs are emitted through `tracing`. In JSON mode every line carries:
//! - `timestamp`: ISO 8601 timestamp
//! - `level`: Log level (trace, debug, info, warn, error)
//! - `target`: Emitting crate/module path
//! - `module`: Modulith module name, when logged through [`log_module_event!`]
//! - `fields`: Additional context fields

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::{TelemetryConfig, TelemetryError};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::InvalidFilter(e.to_string()))?;

    let output: Option<BoxedLayer> = match (config.console_output, config.json_logs) {
        (false, _) => None,
        // JSON output for containers/production
        (true, true) => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        ),
        // Pretty output for development
        (true, false) => Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(true)
                .boxed(),
        ),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(env_filter)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::debug!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Structured logging configured"
    );

    Ok(())
}

/// Log a module lifecycle event with a consistent `module` field.
///
/// ```rust,ignore
/// log_module_event!(info, "cache", "Module initialized", services = 2);
/// ```
#[macro_export]
macro_rules! log_module_event {
    ($level:ident, $module:expr, $msg:expr $(, $($field:tt)*)?) => {
        ::tracing::$level!(
            module = %$module,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a service registry event with standard fields.
#[macro_export]
macro_rules! log_service_event {
    ($level:ident, $module:expr, $service:expr, $msg:expr $(, $($field:tt)*)?) => {
        ::tracing::$level!(
            module = %$module,
            service = %$service,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a tenant-scoped event with standard fields.
#[macro_export]
macro_rules! log_tenant_event {
    ($level:ident, $tenant:expr, $msg:expr $(, $($field:tt)*)?) => {
        ::tracing::$level!(
            tenant = %$tenant,
            $($($field)*,)?
            $msg
        )
    };
}
