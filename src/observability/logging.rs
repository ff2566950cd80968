//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level. JSON output for production,
//! pretty output for development.

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::{LogFormat, ObservabilityConfig};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[error("failed to install subscriber: {0}")]
    Install(String),
}

/// Build the filter: `RUST_LOG` if set, otherwise the configured level.
pub fn build_filter(config: &ObservabilityConfig) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| LoggingError::InvalidFilter {
            filter: config.log_level.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
    };

    result.map_err(|e| LoggingError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_parses() {
        let mut config = ObservabilityConfig::default();
        config.log_level = "evm_transfer_monitor=debug,warn".to_string();
        if std::env::var("RUST_LOG").is_err() {
            assert!(build_filter(&config).is_ok());
        }
    }

    #[test]
    fn test_bad_level_rejected() {
        let mut config = ObservabilityConfig::default();
        config.log_level = "=[not a filter".to_string();
        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(build_filter(&config), Err(LoggingError::InvalidFilter { .. })));
        }
    }
}
