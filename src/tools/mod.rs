//! Tool Façade
//!
//! Exposes media staging and enhancement as named, schema-described tools.
//! Pipeline failures never escape a tool as errors: they are shaped into a
//! reply with `status: ERROR` and a readable message. `ToolError` is reserved
//! for problems with the call itself (unknown tool, malformed arguments).

pub mod builtins;
pub mod registry;
pub mod types;

pub use builtins::{EnhanceImageTool, StageImageTool};
pub use registry::*;
pub use types::*;

use std::sync::Arc;
use thiserror::Error;

use crate::enhance::Enhancer;
use crate::media::MediaIngestor;

/// Errors that can occur when dispatching a tool call
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool parameters: {0}")]
    InvalidParameters(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for tool operations
pub type Result<T> = std::result::Result<T, ToolError>;

/// A callable operation exposed through the façade
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool description
    fn description(&self) -> &str;

    /// Get the JSON schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given parameters
    fn execute(&self, params: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput>>;
}

/// Boxed future for tool execution
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Output from a tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Human-readable rendering of the reply
    pub content: String,
    /// Whether the reply reports a failure
    pub is_error: bool,
    /// The reply as JSON
    pub structured: serde_json::Value,
}

impl ToolOutput {
    /// Build an output from a serializable reply.
    pub fn from_reply<T: serde::Serialize>(reply: &T, is_error: bool) -> Result<Self> {
        let structured = serde_json::to_value(reply)?;
        let content = serde_json::to_string_pretty(&structured)?;
        Ok(Self {
            content,
            is_error,
            structured,
        })
    }
}

/// Build the registry with both media tools.
///
/// `enhancer` is `None` when no backend URL is configured; `enhance_image`
/// then replies with an error instead of being hidden.
pub fn create_registry(
    ingestor: Arc<MediaIngestor>,
    enhancer: Option<Arc<dyn Enhancer>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(StageImageTool::new(ingestor.clone())));
    registry.register(Arc::new(EnhanceImageTool::new(ingestor, enhancer)));
    registry
}

/// Pull the locator out of tool arguments.
///
/// Accepts `locator` and the `url` / `image` aliases. Returns `Ok(None)`
/// when no non-blank locator is present.
pub fn locator_argument(params: &serde_json::Value) -> Result<Option<String>> {
    let obj = match params {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Object(obj) => obj,
        _ => {
            return Err(ToolError::InvalidParameters(
                "arguments must be a JSON object".to_string(),
            ))
        }
    };

    for key in ["locator", "url", "image"] {
        match obj.get(key) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                return Ok(Some(s.trim().to_string()));
            }
            Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null) | None => {}
            Some(_) => {
                return Err(ToolError::InvalidParameters(format!("{key} must be a string")));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_output_from_reply() {
        let output = ToolOutput::from_reply(&json!({"status": "COMPLETED"}), false).unwrap();
        assert!(!output.is_error);
        assert_eq!(output.structured["status"], "COMPLETED");
        assert!(output.content.contains("COMPLETED"));
    }

    #[test]
    fn test_locator_argument() {
        assert_eq!(
            locator_argument(&json!({"locator": " https://a.example/x.png "})).unwrap(),
            Some("https://a.example/x.png".to_string())
        );
        assert_eq!(
            locator_argument(&json!({"url": "https://a.example/x.png"})).unwrap(),
            Some("https://a.example/x.png".to_string())
        );
        assert_eq!(
            locator_argument(&json!({"locator": "", "image": "data:image/png;base64,AA=="}))
                .unwrap(),
            Some("data:image/png;base64,AA==".to_string())
        );
        assert_eq!(locator_argument(&json!({})).unwrap(), None);
        assert_eq!(locator_argument(&json!(null)).unwrap(), None);
        assert_eq!(locator_argument(&json!({"locator": "   "})).unwrap(), None);
    }

    #[test]
    fn test_locator_argument_rejects_bad_shapes() {
        assert!(matches!(
            locator_argument(&json!("https://a.example/x.png")),
            Err(ToolError::InvalidParameters(_))
        ));
        assert!(matches!(
            locator_argument(&json!({"locator": 42})),
            Err(ToolError::InvalidParameters(_))
        ));
    }
}
