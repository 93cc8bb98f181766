//! Configuration loading
//!
//! Layers, later wins: built-in defaults, an optional JSON5 file
//! (`--config` or `RETOUCH_CONFIG`), then `RETOUCH_*` environment variables.
//! The result is validated once and shared read-only.

pub mod types;

pub use types::*;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "RETOUCH_CONFIG";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid field value: {0}")]
    InvalidValue(String),

    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration validation result
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load configuration from the process environment and an optional file.
pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
    load_with(path, |key| std::env::var(key).ok())
}

/// Load configuration with an injectable environment lookup.
pub fn load_with<F>(path: Option<&Path>, env: F) -> ConfigResult<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let file = path
        .map(Path::to_path_buf)
        .or_else(|| env(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()).map(PathBuf::from));

    let mut config = match file {
        Some(file) => from_file(&file)?,
        None => Config::default(),
    };
    config.apply_env_with(env)?;
    config.validate()?;
    Ok(config)
}

/// Parse a JSON5 config file. Missing keys fall back to defaults.
pub fn from_file(path: &Path) -> ConfigResult<Config> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    json5::from_str::<Config>(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

impl Config {
    /// Overlay `RETOUCH_*` variables resolved through `env`.
    pub fn apply_env_with<F>(&mut self, env: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("RETOUCH_BIND") {
            self.bind = v;
        }
        if let Some(v) = get("RETOUCH_PORT").or_else(|| get("PORT")) {
            self.port = parse_env("RETOUCH_PORT", &v)?;
        }
        if let Some(v) = get("RETOUCH_PUBLIC_BASE_URL") {
            self.public_base_url = Some(v);
        }
        if let Some(v) = get("RETOUCH_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = get("RETOUCH_BACKEND_URL") {
            self.backend_url = Some(v);
        }
        if let Some(v) = get("RETOUCH_BACKEND_API_KEY") {
            self.backend_api_key = Some(v);
        }
        if let Some(v) = get("RETOUCH_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_env("RETOUCH_MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = get("RETOUCH_FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = parse_env("RETOUCH_FETCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("RETOUCH_BACKEND_TIMEOUT_SECS") {
            self.backend_timeout_secs = parse_env("RETOUCH_BACKEND_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("RETOUCH_INGEST_POLICY") {
            self.ingest_policy = v.parse().map_err(ConfigError::InvalidValue)?;
        }
        if let Some(v) = get("RETOUCH_ALLOW_PRIVATE_FETCH") {
            self.allow_private_fetch = parse_bool("RETOUCH_ALLOW_PRIVATE_FETCH", &v)?;
        }
        if let Some(v) = get("RETOUCH_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("RETOUCH_LOG_FORMAT") {
            self.logging.format = v.parse().map_err(ConfigError::InvalidValue)?;
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        self.bind_addr()?;
        validate_http_url("publicBaseUrl", &self.public_base_url())?;
        if let Some(backend) = &self.backend_url {
            validate_http_url("backendUrl", backend)?;
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Validation(
                "maxUploadBytes must be greater than zero".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 || self.backend_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> ConfigResult<()> {
    match url::Url::parse(value) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host().is_some() => Ok(()),
        Ok(_) => Err(ConfigError::Validation(format!(
            "{field} must be an http(s) URL, got '{value}'"
        ))),
        Err(e) => Err(ConfigError::Validation(format!(
            "{field} is not a valid URL ({e}): '{value}'"
        ))),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{key}: cannot parse '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!(
            "{key}: expected a boolean, got '{value}'"
        ))),
    }
}
