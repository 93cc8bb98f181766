//! `enhance_image`: re-host an image, then send it to the enhancement backend.

use std::sync::Arc;

use crate::enhance::{https_only, EnhanceError, Enhancer};
use crate::logging::redact_locator;
use crate::media::MediaIngestor;
use crate::tools::{locator_argument, BoxFuture, EnhanceReply, Tool, ToolOutput};

pub struct EnhanceImageTool {
    ingestor: Arc<MediaIngestor>,
    enhancer: Option<Arc<dyn Enhancer>>,
}

impl EnhanceImageTool {
    pub fn new(ingestor: Arc<MediaIngestor>, enhancer: Option<Arc<dyn Enhancer>>) -> Self {
        Self { ingestor, enhancer }
    }

    /// Run the full stage-then-enhance flow and shape the outcome.
    pub async fn enhance(&self, locator: Option<&str>) -> EnhanceReply {
        let Some(locator) = locator else {
            return EnhanceReply::error(
                "No image provided. Pass an https:// link or a data:image/...;base64 inline image as `locator`.",
            );
        };
        let Some(enhancer) = &self.enhancer else {
            return EnhanceReply::error(EnhanceError::NotConfigured.to_string());
        };

        let artifact = match self.ingestor.ingest(locator).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::warn!(
                    locator = %redact_locator(locator),
                    error = %e,
                    "Staging before enhancement failed"
                );
                return EnhanceReply::error(e.to_string());
            }
        };

        match enhancer.enhance(&artifact.public_url).await {
            Ok(result) => {
                let mut reply = EnhanceReply::from(result);
                if reply.original_url.is_empty() {
                    reply.original_url = https_only(&artifact.public_url);
                }
                reply
            }
            Err(e) => {
                tracing::warn!(error = %e, id = %artifact.id, "Enhancement failed");
                EnhanceReply {
                    original_url: https_only(&artifact.public_url),
                    ..EnhanceReply::error(e.to_string())
                }
            }
        }
    }
}

impl Tool for EnhanceImageTool {
    fn name(&self) -> &str {
        "enhance_image"
    }

    fn description(&self) -> &str {
        "Enhance an image and return https links to the original and the enhanced result"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        super::locator_schema(false)
    }

    fn execute(&self, params: serde_json::Value) -> BoxFuture<'_, crate::tools::Result<ToolOutput>> {
        Box::pin(async move {
            let locator = locator_argument(&params)?;
            let reply = self.enhance(locator.as_deref()).await;
            ToolOutput::from_reply(&reply, reply.is_error())
        })
    }
}
