//! describeImage - streamed vision description

use super::{parse_args, require_http_url};
use crate::error::{Error, Result};
use crate::registry::{Tool, ToolContext, ToolDefinition};
use atelier_llm::{CompletionRequest, ImageContent, LlmProvider, Message, StreamChunk};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const DESCRIBE_PROMPT: &str = "Describe this image in detail.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeImageArgs {
    image_url: String,
}

impl DescribeImageArgs {
    fn parse(input: &serde_json::Value) -> Result<Self> {
        let args: Self = parse_args(input)?;
        require_http_url("imageUrl", &args.image_url)?;
        Ok(args)
    }
}

/// Tool that describes an image with a vision model
pub struct DescribeImageTool {
    definition: ToolDefinition,
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl DescribeImageTool {
    /// Create the tool backed by `provider`
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        let definition = ToolDefinition::new(
            "describeImage",
            "Gets a detailed text description of an image from a URL.",
        )
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "imageUrl": {
                    "type": "string",
                    "format": "uri",
                    "description": "The URL of the image to describe."
                }
            },
            "required": ["imageUrl"]
        }));

        Self {
            definition,
            provider,
            model: model.into(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for DescribeImageTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        DescribeImageArgs::parse(input).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let args = DescribeImageArgs::parse(&input)?;
        debug!(tool_call_id = %ctx.tool_call_id, image_url = %args.image_url, "Describing image");

        let request = CompletionRequest::new(self.model.clone()).with_message(
            Message::user_with_images(DESCRIBE_PROMPT, vec![ImageContent::url(args.image_url)]),
        );
        let mut stream = self.provider.stream(request.into()).await?;

        let mut description = String::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(Ok(StreamChunk::TextDelta(delta))) => {
                    description.push_str(&delta);
                    ctx.emitter
                        .image_description(&ctx.tool_call_id, description.clone())
                        .await?;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        Ok(serde_json::json!({ "description": description }))
    }
}
