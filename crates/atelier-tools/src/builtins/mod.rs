//! Builtins - the image assistant's tools
//!
//! - `createImage`: text to image
//! - `editImage`: image to image
//! - `describeImage`: vision model description, streamed

mod create_image;
mod describe_image;
mod edit_image;

pub use create_image::CreateImageTool;
pub use describe_image::DescribeImageTool;
pub use edit_image::EditImageTool;

use crate::error::{Error, Result};
use crate::generation::ImagingSettings;
use crate::registry::ToolRegistry;
use atelier_llm::LlmProvider;
use std::sync::Arc;
use url::Url;

/// Configuration for built-in tools
#[derive(Clone)]
pub struct BuiltinsConfig {
    /// Provider endpoints and sampler settings
    pub imaging: ImagingSettings,
    /// Vision-capable model used by `describeImage`
    pub vision_provider: Arc<dyn LlmProvider>,
    /// Model name for `describeImage` (empty means provider default)
    pub vision_model: String,
}

/// Register all built-in tools with the registry
pub fn register_builtins(registry: &mut ToolRegistry, config: &BuiltinsConfig) {
    registry.register(Arc::new(CreateImageTool::new(config.imaging.clone())));
    registry.register(Arc::new(EditImageTool::new(config.imaging.clone())));
    registry.register(Arc::new(DescribeImageTool::new(
        config.vision_provider.clone(),
        config.vision_model.clone(),
    )));
}

/// Deserialize tool arguments into their typed form
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(
    input: &serde_json::Value,
) -> Result<T> {
    serde_json::from_value(input.clone()).map_err(|e| Error::InvalidInput(e.to_string()))
}

/// Reject blank prompts
pub(crate) fn require_prompt(prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(Error::InvalidInput("prompt must not be empty".to_string()));
    }
    Ok(())
}

/// Require an absolute http(s) URL
pub(crate) fn require_http_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| Error::InvalidInput(format!("{field} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::InvalidInput(format!(
            "{field} must be an http(s) URL, got '{scheme}'"
        ))),
    }
}

/// Optional URL argument: blank means absent, otherwise it must be http(s)
pub(crate) fn optional_http_url(field: &str, value: Option<String>) -> Result<Option<String>> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(url) => {
            require_http_url(field, &url)?;
            Ok(Some(url))
        }
        None => Ok(None),
    }
}
