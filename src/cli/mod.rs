//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `start` (default) -- start the HTTP server
//! - `stage <locator>` -- re-host one image and print the reply
//! - `enhance [<locator>]` -- re-host and enhance one image
//! - `config` -- print the effective configuration (secrets redacted)
//! - `status` -- query a running instance for health info
//! - `version` -- print build/version info

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use crate::config::{Config, DEFAULT_PORT};
use crate::server::AppState;

/// Image staging gateway.
#[derive(Parser, Debug)]
#[command(
    name = "retouch",
    version = env!("CARGO_PKG_VERSION"),
    about = "retouch: re-host images behind public links and send them for enhancement"
)]
pub struct Cli {
    /// Path to a JSON5 config file (overrides RETOUCH_CONFIG).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Start,

    /// Re-host one image and print the structured reply as JSON.
    Stage {
        /// https/http link or data:image/...;base64 payload.
        locator: String,
    },

    /// Re-host one image, send it to the enhancement backend, print the reply.
    Enhance {
        /// https/http link or data:image/...;base64 payload.
        locator: Option<String>,
    },

    /// Print the effective configuration (secrets redacted) as JSON.
    Config,

    /// Query a running instance for health information.
    Status {
        /// Port of the running instance (default: from config or 8787).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host of the running instance.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Print version, build date, and git commit information.
    Version,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Secrets that should be redacted when printing config.
const SECRET_KEYS: &[&str] = &["apikey", "api_key", "token", "secret", "password"];

/// Run one tool in-process. Returns `true` when the reply reports an error.
pub async fn handle_tool(
    config: &Config,
    tool: &str,
    locator: Option<&str>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let state = AppState::from_config(config).await?;
    let arguments = match locator {
        Some(locator) => json!({ "locator": locator }),
        None => json!({}),
    };
    let output = state.registry.call(tool, arguments).await?;
    println!("{}", output.content);
    Ok(output.is_error)
}

/// Run the `config` subcommand.
pub fn handle_config_show(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let value = serde_json::to_value(config)?;
    let pretty = serde_json::to_string_pretty(&redact_secrets(value))?;
    println!("{}", pretty);
    Ok(())
}

/// Run the `status` subcommand -- query `/health` on a running instance.
pub async fn handle_status(
    config: &Config,
    host: &str,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let port = resolve_port(port, config);
    let url = format!("http://{}:{}/health", host, port);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    let response = match client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            return Err(format!(
                "could not connect to retouch at {}:{} ({}). Is the server running? Start it with: retouch start",
                host, port, e
            )
            .into());
        }
    };

    if !response.status().is_success() {
        return Err(format!("health endpoint returned HTTP {}", response.status()).into());
    }

    let body: Value = response.json().await?;

    println!("retouch status");
    println!("==============");
    if let Some(version) = body.get("version").and_then(|v| v.as_str()) {
        println!("  Version:  {}", version);
    }
    println!("  Address:  {}:{}", host, port);
    if let Some(status) = body.get("status").and_then(|v| v.as_str()) {
        println!("  Status:   {}", status);
    }
    Ok(())
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("retouch {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("RETOUCH_BUILD_DATE"));
    println!("  Git commit: {}", env!("RETOUCH_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Redact known secret keys in a JSON value (recursive).
fn redact_secrets(mut value: Value) -> Value {
    match &mut value {
        Value::Object(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                let lower = key.to_lowercase();
                if SECRET_KEYS.iter().any(|s| lower.contains(s)) {
                    map.insert(key, Value::String("[REDACTED]".to_string()));
                } else if let Some(child) = map.remove(&key) {
                    map.insert(key, redact_secrets(child));
                }
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                *item = redact_secrets(item.take());
            }
        }
        _ => {}
    }
    value
}

/// Explicit flag, then the configured port, then the default.
fn resolve_port(explicit: Option<u16>, config: &Config) -> u16 {
    explicit
        .or(Some(config.port).filter(|p| *p != 0))
        .unwrap_or(DEFAULT_PORT)
}
