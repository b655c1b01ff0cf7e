//! Logging bootstrap.

use crate::config::LoggingConfig;
use crate::error::TelemetryError;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// The level string is an `EnvFilter` directive; an invalid one falls back
/// to `info`. Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    result.map_err(|e| TelemetryError(e.to_string()))
}
