//! Logging setup
//!
//! Installs a `tracing` subscriber with an `EnvFilter` and a fmt layer:
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, falling back to the configured level)
//!   └── Fmt Layer (pretty or JSON console output)
//! ```

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Logging initialisation errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    SubscriberError(String),
}

/// Build the filter: RUST_LOG wins, then the explicit level, then the config
fn build_filter(
    config: &LoggingConfig,
    level: Option<&str>,
) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = level.unwrap_or(&config.level);
    EnvFilter::try_new(directive)
        .map_err(|_| TelemetryError::InvalidFilter(directive.to_string()))
}

/// Initialize the global tracing subscriber
///
/// `level` overrides the configured fallback level (e.g. from the command line).
pub fn init_subscriber(config: &LoggingConfig, level: Option<&str>) -> Result<(), TelemetryError> {
    let env_filter = build_filter(config, level)?;

    if config.format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer);

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| TelemetryError::SubscriberError(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer);

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| TelemetryError::SubscriberError(e.to_string()))?;
    }

    Ok(())
}
