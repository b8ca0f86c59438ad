//! createImage - text to image

use super::{optional_http_url, parse_args, require_prompt};
use crate::error::Result;
use crate::generation::{run_generation, GenerationRequest, ImagingSettings};
use crate::registry::{Tool, ToolContext, ToolDefinition};
use atelier_imaging::ImageSize;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateImageArgs {
    prompt: String,
    #[serde(default)]
    image_size: ImageSize,
    #[serde(default)]
    lora_url: Option<String>,
}

impl CreateImageArgs {
    fn parse(input: &serde_json::Value) -> Result<Self> {
        let mut args: Self = parse_args(input)?;
        require_prompt(&args.prompt)?;
        args.lora_url = optional_http_url("loraUrl", args.lora_url)?;
        Ok(args)
    }
}

/// Tool that creates a new image from a prompt
pub struct CreateImageTool {
    definition: ToolDefinition,
    settings: ImagingSettings,
}

impl CreateImageTool {
    /// Create the tool
    #[must_use]
    pub fn new(settings: ImagingSettings) -> Self {
        let sizes: Vec<&str> = ImageSize::ALL.iter().map(ImageSize::as_str).collect();
        let definition = ToolDefinition::new("createImage", "Create a new image.").with_parameters(
            serde_json::json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "The prompt for the image"
                    },
                    "imageSize": {
                        "type": "string",
                        "enum": sizes,
                        "default": ImageSize::default().as_str(),
                        "description": "The size/aspect ratio of the image to generate"
                    },
                    "loraUrl": {
                        "type": "string",
                        "format": "uri",
                        "description": "Optional LoRA URL for style application"
                    }
                },
                "required": ["prompt"]
            }),
        );

        Self {
            definition,
            settings,
        }
    }
}

#[async_trait::async_trait]
impl Tool for CreateImageTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        CreateImageArgs::parse(input).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let args = CreateImageArgs::parse(&input)?;
        let request = GenerationRequest::create(args.prompt, args.image_size, args.lora_url);
        let outcome = run_generation(&ctx, &self.settings, request).await?;
        Ok(serde_json::json!({
            "prompt": outcome.prompt,
            "imageUrl": outcome.image_url,
        }))
    }
}
