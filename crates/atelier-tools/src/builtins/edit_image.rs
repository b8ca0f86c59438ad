//! editImage - image to image

use super::{optional_http_url, parse_args, require_http_url, require_prompt};
use crate::error::Result;
use crate::generation::{run_generation, GenerationRequest, ImagingSettings};
use crate::registry::{Tool, ToolContext, ToolDefinition};
use atelier_imaging::ResolutionMode;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditImageArgs {
    prompt: String,
    image_url: String,
    #[serde(default)]
    resolution_mode: ResolutionMode,
    #[serde(default)]
    lora_url: Option<String>,
}

impl EditImageArgs {
    fn parse(input: &serde_json::Value) -> Result<Self> {
        let mut args: Self = parse_args(input)?;
        require_prompt(&args.prompt)?;
        require_http_url("imageUrl", &args.image_url)?;
        args.lora_url = optional_http_url("loraUrl", args.lora_url)?;
        Ok(args)
    }
}

/// Tool that edits an existing image
pub struct EditImageTool {
    definition: ToolDefinition,
    settings: ImagingSettings,
}

impl EditImageTool {
    /// Create the tool
    #[must_use]
    pub fn new(settings: ImagingSettings) -> Self {
        let modes: Vec<&str> = ResolutionMode::ALL
            .iter()
            .map(ResolutionMode::as_str)
            .collect();
        let definition = ToolDefinition::new("editImage", "Edit an existing image.")
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "The prompt for the image"
                    },
                    "resolutionMode": {
                        "type": "string",
                        "enum": modes,
                        "default": ResolutionMode::default().as_str(),
                        "description": "The size/aspect ratio of the image to generate"
                    },
                    "imageUrl": {
                        "type": "string",
                        "format": "uri",
                        "description": "The URL of the image to edit"
                    },
                    "loraUrl": {
                        "type": "string",
                        "format": "uri",
                        "description": "Optional LoRA URL for style application"
                    }
                },
                "required": ["prompt", "imageUrl"]
            }));

        Self {
            definition,
            settings,
        }
    }
}

#[async_trait::async_trait]
impl Tool for EditImageTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        EditImageArgs::parse(input).map(|_| ())
    }

    async fn execute(
        &self,
        ctx: ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let args = EditImageArgs::parse(&input)?;
        let request = GenerationRequest::edit(
            args.prompt,
            args.image_url,
            args.resolution_mode,
            args.lora_url,
        );
        let outcome = run_generation(&ctx, &self.settings, request).await?;
        Ok(serde_json::json!({
            "prompt": outcome.prompt,
            "imageUrl": outcome.image_url,
        }))
    }
}
