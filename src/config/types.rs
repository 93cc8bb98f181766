//! Typed configuration structures
//!
//! Provides strongly-typed access to configuration values with validation
//! and default values.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::enhance::DEFAULT_BACKEND_TIMEOUT_SECS;
use crate::media::{FetchConfig, IngestPolicy, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_BYTES};

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8787;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Listen address
    pub bind: String,

    /// Listen port
    pub port: u16,

    /// Base URL under which `/files/...` is reachable from outside.
    /// Derived from bind/port when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,

    /// Directory artifacts are written to
    pub storage_dir: PathBuf,

    /// Enhancement backend endpoint; enhancement is disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,

    /// Bearer token sent to the backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_api_key: Option<String>,

    /// Size ceiling for any single image, in bytes
    pub max_upload_bytes: usize,

    /// Total timeout for one remote fetch
    pub fetch_timeout_secs: u64,

    /// Total timeout for one backend call
    pub backend_timeout_secs: u64,

    /// Which locator kinds are accepted
    pub ingest_policy: IngestPolicy,

    /// Allow fetching from loopback/private hosts
    pub allow_private_fetch: bool,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            public_base_url: None,
            storage_dir: std::env::temp_dir().join("retouch-uploads"),
            backend_url: None,
            backend_api_key: None,
            max_upload_bytes: DEFAULT_MAX_BYTES,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            backend_timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            ingest_policy: IngestPolicy::default(),
            allow_private_fetch: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Public base URL, configured or derived from the listen address.
    pub fn public_base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = match self.bind.parse::<IpAddr>() {
                    Ok(ip) if ip.is_unspecified() => "localhost".to_string(),
                    Ok(IpAddr::V6(ip)) => format!("[{ip}]"),
                    _ => self.bind.clone(),
                };
                format!("http://{}:{}", host, self.port)
            }
        }
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, super::ConfigError> {
        let ip: IpAddr = self.bind.parse().map_err(|_| {
            super::ConfigError::InvalidValue(format!("bind: '{}' is not an IP address", self.bind))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Settings for the remote fetcher.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            max_bytes: self.max_upload_bytes,
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            allow_private: self.allow_private_fetch,
            ..FetchConfig::default()
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace) or a full filter directive
    pub level: String,

    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "plain" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.port, 8787);
        assert_eq!(config.max_upload_bytes, 15 * 1024 * 1024);
        assert_eq!(config.fetch_timeout_secs, 20);
        assert_eq!(config.backend_timeout_secs, 120);
        assert_eq!(config.ingest_policy, IngestPolicy::RemoteAndInline);
        assert!(!config.allow_private_fetch);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.storage_dir.ends_with("retouch-uploads"));
    }

    #[test]
    fn test_public_base_url_derivation() {
        let mut config = Config::default();
        assert_eq!(config.public_base_url(), "http://127.0.0.1:8787");

        config.bind = "0.0.0.0".to_string();
        config.port = 9000;
        assert_eq!(config.public_base_url(), "http://localhost:9000");

        config.bind = "::1".to_string();
        assert_eq!(config.public_base_url(), "http://[::1]:9000");

        config.public_base_url = Some("https://img.example/".to_string());
        assert_eq!(config.public_base_url(), "https://img.example");
    }

    #[test]
    fn test_bind_addr() {
        let mut config = Config::default();
        assert_eq!(config.bind_addr().unwrap(), "127.0.0.1:8787".parse().unwrap());

        config.bind = "not-an-ip".to_string();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_fetch_config() {
        let config = Config {
            max_upload_bytes: 1024,
            fetch_timeout_secs: 3,
            allow_private_fetch: true,
            ..Config::default()
        };
        let fetch = config.fetch_config();
        assert_eq!(fetch.max_bytes, 1024);
        assert_eq!(fetch.timeout, Duration::from_secs(3));
        assert!(fetch.allow_private);
    }

    #[test]
    fn test_deserialize_camel_case_with_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"port": 9001, "backendUrl": "https://enhance.example/api", "ingestPolicy": "https-only", "logging": {"format": "json"}}"#,
        )
        .unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.backend_url.as_deref(), Some("https://enhance.example/api"));
        assert_eq!(config.ingest_policy, IngestPolicy::HttpsOnly);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("plain".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
