//! Structured logging setup.
//!
//! The client itself only emits `tracing` events; applications that do not
//! install their own subscriber can call [`init_logging`].

use std::env;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `qc_index_client=debug`
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl LogConfig {
    /// Load from environment variables.
    ///
    /// - `QC_LOG_LEVEL` or `RUST_LOG`: filter directive (default: info)
    /// - `QC_JSON_LOGS`: `true`/`1` for JSON output (default: false)
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("QC_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),
            json_logs: env::var("QC_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Failure installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid filter directive: {0}")]
    InvalidFilter(String),
    #[error("subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Install a global fmt subscriber.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?;

    let result = if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };
    result.map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;

    tracing::debug!(level = %config.log_level, json = config.json_logs, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = LogConfig {
            log_level: "qc_index_client=notalevel".to_string(),
            json_logs: false,
        };
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_second_init_reports_installed() {
        let config = LogConfig {
            log_level: "warn".to_string(),
            json_logs: false,
        };
        let _ = init_logging(&config);
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::AlreadyInstalled(_))
        ));
    }
}
