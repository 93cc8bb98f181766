//! Structured logging setup
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and either a
//! JSON or plain-text fmt layer. `RUST_LOG` takes precedence over the
//! configured level when set.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};

/// Logging error types
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Initialization error: {0}")]
    InitError(String),
}

/// Build the filter: `RUST_LOG` if present, otherwise the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
        filter: config.level.clone(),
        message: e.to_string(),
    })
}

/// Initialize logging with the given configuration
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = build_filter(config)?;

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| LoggingError::InitError(e.to_string()))?;

    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}

/// Loggable summary of a locator: inline payloads are reduced to their length.
pub fn redact_locator(locator: &str) -> String {
    match locator.split_once(',') {
        Some((header, payload)) if header.to_ascii_lowercase().starts_with("data:") => {
            format!("{header},<{} chars>", payload.len())
        }
        _ => locator.chars().take(200).collect(),
    }
}
