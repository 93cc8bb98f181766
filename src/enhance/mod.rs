//! Enhancement backend client.
//!
//! Sends one JSON `POST { "image_url": ... }` per call to the configured
//! backend and normalizes its envelope:
//!
//! ```text
//! { "data": { "status"?, "original_url"?, "enhanced_url"? } } | { "error": ... }
//! ```
//!
//! Only `https://` locators ever leave this module; anything else the backend
//! returns is replaced with an empty string.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::media::fetch::{read_prefix, CONNECT_TIMEOUT_SECS};

/// Status reported when the backend omits one.
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// Status used for failures surfaced to callers.
pub const STATUS_ERROR: &str = "ERROR";

/// Default total timeout for one backend call.
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 120;

const BODY_EXCERPT_CHARS: usize = 300;

/// Largest backend reply read into memory.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Errors from the enhancement backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnhanceError {
    #[error("enhancement backend is not configured")]
    NotConfigured,

    #[error("enhancement backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("enhancement backend returned HTTP {status}: {body}")]
    BackendHttpError { status: u16, body: String },

    #[error("enhancement backend returned an unreadable response: {0}")]
    BackendProtocolError(String),

    #[error("enhancement backend reported an error: {0}")]
    BackendReportedError(String),
}

/// Normalized backend outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementResult {
    pub status: String,
    pub original_url: String,
    pub enhanced_url: String,
    pub message: String,
}

impl EnhancementResult {
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_COMPLETED)
    }
}

/// Something that can enhance an image reachable at a public URL.
#[async_trait]
pub trait Enhancer: Send + Sync {
    /// Ask the backend to enhance the image at `image_url`.
    async fn enhance(&self, image_url: &str) -> Result<EnhancementResult, EnhanceError>;
}

/// HTTP client for the enhancement backend.
pub struct EnhancementClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl EnhancementClient {
    /// Create a client for `endpoint` with a bounded request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, EnhanceError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(EnhanceError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                EnhanceError::BackendUnreachable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.trim().to_string(),
            api_key: None,
        })
    }

    /// Send `key` as a bearer token on every call.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = Some(key).filter(|k| !k.trim().is_empty());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Enhancer for EnhancementClient {
    async fn enhance(&self, image_url: &str) -> Result<EnhancementResult, EnhanceError> {
        tracing::info!(endpoint = %self.endpoint, "Calling enhancement backend");

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "image_url": image_url }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EnhanceError::BackendUnreachable(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Enhancement backend returned an error status");
            let (prefix, _) = read_prefix(response, BODY_EXCERPT_CHARS * 4)
                .await
                .unwrap_or_default();
            return Err(EnhanceError::BackendHttpError {
                status: status.as_u16(),
                body: truncate(&String::from_utf8_lossy(&prefix), BODY_EXCERPT_CHARS),
            });
        }

        let (bytes, truncated) = read_prefix(response, MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| EnhanceError::BackendProtocolError(format!("failed to read body: {e}")))?;
        if truncated {
            return Err(EnhanceError::BackendProtocolError(format!(
                "response body exceeds {MAX_RESPONSE_BYTES} bytes"
            )));
        }
        let body = String::from_utf8_lossy(&bytes);

        let result = parse_envelope(&body)?;
        tracing::info!(status = %result.status, "Enhancement backend replied");
        Ok(result)
    }
}

/// Parse a 2xx backend body into a normalized result.
///
/// A top-level `error` wins over any `data` in the same envelope.
pub fn parse_envelope(body: &str) -> Result<EnhancementResult, EnhanceError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        EnhanceError::BackendProtocolError(format!(
            "{e} (body: {})",
            truncate(body, BODY_EXCERPT_CHARS)
        ))
    })?;
    let obj = value.as_object().ok_or_else(|| {
        EnhanceError::BackendProtocolError("response is not a JSON object".to_string())
    })?;

    if let Some(error) = obj.get("error").filter(|e| !e.is_null()) {
        return Err(EnhanceError::BackendReportedError(error_message(error)));
    }

    let data = obj.get("data").and_then(Value::as_object).unwrap_or(obj);
    let text = |key: &str| data.get(key).and_then(Value::as_str).map(str::trim);

    let status = text("status")
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .unwrap_or_else(|| STATUS_COMPLETED.to_string());
    let enhanced_url = https_only(text("enhanced_url").unwrap_or_default());
    let original_url = https_only(text("original_url").unwrap_or_default());

    let message = text("message")
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_message(&status, &enhanced_url));

    Ok(EnhancementResult {
        status,
        original_url,
        enhanced_url,
        message,
    })
}

/// Keep `url` only if it is an absolute `https://` URL.
pub fn https_only(url: &str) -> String {
    let url = url.trim();
    match url::Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "https" && parsed.host().is_some() => url.to_string(),
        _ => String::new(),
    }
}

fn default_message(status: &str, enhanced_url: &str) -> String {
    if status == STATUS_COMPLETED {
        if enhanced_url.is_empty() {
            "Enhancement completed, but the backend returned no enhanced image URL".to_string()
        } else {
            "Image enhanced successfully".to_string()
        }
    } else {
        format!("Enhancement status: {status}")
    }
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
