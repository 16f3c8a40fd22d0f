//! # Modulith Telemetry
//!
//! Logging setup shared by every Modulith binary.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use modulith_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("Failed to init telemetry");
//!     // Application code; logs now flow through tracing-subscriber
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MODULITH_SERVICE_NAME` | `modulith` | Service name in logs |
//! | `MODULITH_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `MODULITH_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `MODULITH_JSON_LOGS` | `false` | JSON lines output (default `true` in containers) |

mod config;
mod logging;

pub use config::TelemetryConfig;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Failed to install global subscriber: {0}")]
    SubscriberInit(String),
}

/// Initialize logging for the process.
///
/// Returns a guard to hold for the lifetime of the application. Calling
/// this twice in one process fails with [`TelemetryError::SubscriberInit`].
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    logging::init_logging(&config)?;

    tracing::info!(service = %config.service_name, "Telemetry initialized");

    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active. Drop to log shutdown.
pub struct TelemetryGuard {
    service_name: String,
}

impl TelemetryGuard {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry...");
    }
}

/// Convenience macro for creating a span with module context.
///
/// ```rust,ignore
/// let span = module_span!("init", module = "cache");
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! module_span {
    ($name:expr, $($field:tt)*) => {
        ::tracing::info_span!($name, $($field)*)
    };
}
