//! Built-in Tools
//!
//! The two media tools every retouch server exposes.

pub mod enhance;
pub mod stage;

pub use enhance::EnhanceImageTool;
pub use stage::StageImageTool;

use serde_json::json;

/// Parameter schema shared by both tools.
fn locator_schema(required: bool) -> serde_json::Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "locator": {
                "type": "string",
                "description": "An https:// or http:// image link, or a data:image/...;base64 inline image"
            }
        }
    });
    if required {
        schema["required"] = json!(["locator"]);
    }
    schema
}
