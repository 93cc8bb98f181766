//! Tool Types
//!
//! Wire shapes for listing and calling tools, plus the replies the media
//! tools produce.

use serde::{Deserialize, Serialize};

use crate::enhance::{EnhancementResult, STATUS_COMPLETED, STATUS_ERROR};

use super::ToolOutput;

/// Tool definition as listed by `GET /tools`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for parameters
    pub input_schema: serde_json::Value,
}

/// Body of `POST /tools/call`
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Reply to a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResponse {
    pub content: String,
    pub is_error: bool,
    pub structured_content: serde_json::Value,
}

impl From<ToolOutput> for ToolCallResponse {
    fn from(output: ToolOutput) -> Self {
        Self {
            content: output.content,
            is_error: output.is_error,
            structured_content: output.structured,
        }
    }
}

/// Reply of `stage_image`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReply {
    pub status: String,
    pub message: String,
    pub url: String,
}

impl StageReply {
    pub fn completed(url: impl Into<String>) -> Self {
        Self {
            status: STATUS_COMPLETED.to_string(),
            message: "Image staged successfully".to_string(),
            url: url.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: message.into(),
            url: String::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }
}

/// Reply of `enhance_image`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceReply {
    pub original_url: String,
    pub enhanced_url: String,
    pub status: String,
    pub message: String,
}

impl EnhanceReply {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            original_url: String::new(),
            enhanced_url: String::new(),
            status: STATUS_ERROR.to_string(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }
}

impl From<EnhancementResult> for EnhanceReply {
    fn from(result: EnhancementResult) -> Self {
        Self {
            original_url: result.original_url,
            enhanced_url: result.enhanced_url,
            status: result.status,
            message: result.message,
        }
    }
}
