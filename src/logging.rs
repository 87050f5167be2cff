//! Diagnostic logging.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::SyncError;

/// Install the global subscriber.
///
/// # Errors
///
/// Returns `SyncError::Config` if `level` is not a valid filter or a
/// subscriber is already installed.
pub fn init(level: &str, json: bool) -> Result<(), SyncError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| SyncError::Config(format!("Invalid log level '{level}': {e}")))?,
    };

    let fmt_layer = if json {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| SyncError::Config(format!("Failed to install logger: {e}")))
}
