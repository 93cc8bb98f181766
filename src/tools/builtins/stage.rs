//! `stage_image`: re-host an image behind a public link.

use std::sync::Arc;

use crate::logging::redact_locator;
use crate::media::MediaIngestor;
use crate::tools::{locator_argument, BoxFuture, StageReply, Tool, ToolOutput};

pub struct StageImageTool {
    ingestor: Arc<MediaIngestor>,
}

impl StageImageTool {
    pub fn new(ingestor: Arc<MediaIngestor>) -> Self {
        Self { ingestor }
    }

    /// Stage `locator` and shape the outcome into a reply.
    pub async fn stage(&self, locator: Option<&str>) -> StageReply {
        let Some(locator) = locator else {
            return StageReply::error(
                "No image provided. Pass an https:// link or a data:image/...;base64 inline image as `locator`.",
            );
        };

        match self.ingestor.ingest(locator).await {
            Ok(artifact) => StageReply::completed(artifact.public_url),
            Err(e) => {
                tracing::warn!(locator = %redact_locator(locator), error = %e, "Staging failed");
                StageReply::error(e.to_string())
            }
        }
    }
}

impl Tool for StageImageTool {
    fn name(&self) -> &str {
        "stage_image"
    }

    fn description(&self) -> &str {
        "Copy an image to this server and return a public https link to it"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        super::locator_schema(true)
    }

    fn execute(&self, params: serde_json::Value) -> BoxFuture<'_, crate::tools::Result<ToolOutput>> {
        Box::pin(async move {
            let locator = locator_argument(&params)?;
            let reply = self.stage(locator.as_deref()).await;
            ToolOutput::from_reply(&reply, reply.is_error())
        })
    }
}
