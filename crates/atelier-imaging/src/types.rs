//! Request and response payloads for image generation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named aspect presets accepted by the text-to-image endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageSize {
    /// 1024x1024
    #[serde(rename = "square_hd")]
    SquareHd,
    /// 512x512
    #[serde(rename = "square")]
    Square,
    /// 3:4 portrait
    #[default]
    #[serde(rename = "portrait_4_3")]
    Portrait4x3,
    /// 9:16 portrait
    #[serde(rename = "portrait_16_9")]
    Portrait16x9,
    /// 4:3 landscape
    #[serde(rename = "landscape_4_3")]
    Landscape4x3,
    /// 16:9 landscape
    #[serde(rename = "landscape_16_9")]
    Landscape16x9,
}

impl ImageSize {
    /// All presets, in schema order
    pub const ALL: [ImageSize; 6] = [
        Self::SquareHd,
        Self::Square,
        Self::Portrait4x3,
        Self::Portrait16x9,
        Self::Landscape4x3,
        Self::Landscape16x9,
    ];

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SquareHd => "square_hd",
            Self::Square => "square",
            Self::Portrait4x3 => "portrait_4_3",
            Self::Portrait16x9 => "portrait_16_9",
            Self::Landscape4x3 => "landscape_4_3",
            Self::Landscape16x9 => "landscape_16_9",
        }
    }
}

/// Output resolution modes accepted by the edit endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionMode {
    /// Keep the input image's aspect ratio
    #[default]
    #[serde(rename = "match_input")]
    MatchInput,
    /// 1:1
    #[serde(rename = "1:1")]
    Ratio1x1,
    /// 16:9
    #[serde(rename = "16:9")]
    Ratio16x9,
    /// 21:9
    #[serde(rename = "21:9")]
    Ratio21x9,
    /// 3:2
    #[serde(rename = "3:2")]
    Ratio3x2,
    /// 2:3
    #[serde(rename = "2:3")]
    Ratio2x3,
    /// 4:5
    #[serde(rename = "4:5")]
    Ratio4x5,
    /// 5:4
    #[serde(rename = "5:4")]
    Ratio5x4,
    /// 3:4
    #[serde(rename = "3:4")]
    Ratio3x4,
    /// 4:3
    #[serde(rename = "4:3")]
    Ratio4x3,
    /// 9:16
    #[serde(rename = "9:16")]
    Ratio9x16,
    /// 9:21
    #[serde(rename = "9:21")]
    Ratio9x21,
}

impl ResolutionMode {
    /// All modes, in schema order
    pub const ALL: [ResolutionMode; 12] = [
        Self::MatchInput,
        Self::Ratio1x1,
        Self::Ratio16x9,
        Self::Ratio21x9,
        Self::Ratio3x2,
        Self::Ratio2x3,
        Self::Ratio4x5,
        Self::Ratio5x4,
        Self::Ratio3x4,
        Self::Ratio4x3,
        Self::Ratio9x16,
        Self::Ratio9x21,
    ];

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchInput => "match_input",
            Self::Ratio1x1 => "1:1",
            Self::Ratio16x9 => "16:9",
            Self::Ratio21x9 => "21:9",
            Self::Ratio3x2 => "3:2",
            Self::Ratio2x3 => "2:3",
            Self::Ratio4x5 => "4:5",
            Self::Ratio5x4 => "5:4",
            Self::Ratio3x4 => "3:4",
            Self::Ratio4x3 => "4:3",
            Self::Ratio9x16 => "9:16",
            Self::Ratio9x21 => "9:21",
        }
    }
}

/// Whether a generation starts from text or from an existing image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    /// Text to image
    Create,
    /// Image to image
    Edit,
}

impl GenerationKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A style adapter applied on top of the base model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraWeight {
    /// LoRA weights URL
    pub path: String,
    /// Blend strength
    pub scale: f32,
}

/// Sampler settings shared by every generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Denoising steps
    #[serde(default = "default_steps")]
    pub num_inference_steps: u32,
    /// Classifier-free guidance scale
    #[serde(default = "default_guidance")]
    pub guidance_scale: f32,
    /// Images per request
    #[serde(default = "default_num_images")]
    pub num_images: u32,
    /// Provider-side NSFW filter
    #[serde(default = "default_safety_checker")]
    pub enable_safety_checker: bool,
}

fn default_steps() -> u32 {
    30
}

fn default_guidance() -> f32 {
    2.5
}

fn default_num_images() -> u32 {
    1
}

fn default_safety_checker() -> bool {
    true
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            num_inference_steps: default_steps(),
            guidance_scale: default_guidance(),
            num_images: default_num_images(),
            enable_safety_checker: default_safety_checker(),
        }
    }
}

/// Body sent to a generation endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationInput {
    /// Text prompt
    pub prompt: String,
    /// Sampler settings
    #[serde(flatten)]
    pub inference: InferenceConfig,
    /// Output size (create only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<ImageSize>,
    /// Output resolution (edit only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_mode: Option<ResolutionMode>,
    /// Source image (edit only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Style adapters
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loras: Vec<LoraWeight>,
}

impl GenerationInput {
    /// Text-to-image input
    #[must_use]
    pub fn create(prompt: impl Into<String>, size: ImageSize, inference: InferenceConfig) -> Self {
        Self {
            prompt: prompt.into(),
            inference,
            image_size: Some(size),
            resolution_mode: None,
            image_url: None,
            loras: Vec::new(),
        }
    }

    /// Image-to-image input
    #[must_use]
    pub fn edit(
        prompt: impl Into<String>,
        image_url: impl Into<String>,
        mode: ResolutionMode,
        inference: InferenceConfig,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            inference,
            image_size: None,
            resolution_mode: Some(mode),
            image_url: Some(image_url.into()),
            loras: Vec::new(),
        }
    }

    /// Apply a style adapter at full strength
    #[must_use]
    pub fn with_lora(mut self, path: impl Into<String>) -> Self {
        self.loras.push(LoraWeight {
            path: path.into(),
            scale: 1.0,
        });
        self
    }
}

/// One image in a provider payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderImage {
    /// Ephemeral URL (or data URI) of the image
    pub url: String,
    /// Pixel width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ProviderImage {
    /// Image with only a URL
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: None,
            height: None,
            content_type: None,
        }
    }
}

/// A partial or final result from a generation stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// Images produced so far
    #[serde(default)]
    pub images: Vec<ProviderImage>,
    /// Seed used by the sampler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Prompt as the provider saw it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Result nested under `data`, as some endpoints deliver it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<OutputData>,
}

/// Body of a `{"data": {...}}` wrapped result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    /// Images produced so far
    #[serde(default)]
    pub images: Vec<ProviderImage>,
}

impl GenerationOutput {
    /// Output carrying a single image
    #[must_use]
    pub fn with_image(url: impl Into<String>) -> Self {
        Self {
            images: vec![ProviderImage::url(url)],
            ..Default::default()
        }
    }

    /// URL of the first image, if any
    ///
    /// A wrapped `data.images` list wins over the top-level one.
    #[must_use]
    pub fn first_url(&self) -> Option<&str> {
        fn first(images: &[ProviderImage]) -> Option<&str> {
            images
                .first()
                .map(|image| image.url.as_str())
                .filter(|url| !url.is_empty())
        }
        self.data
            .as_ref()
            .and_then(|data| first(&data.images))
            .or_else(|| first(&self.images))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_size_wire_names() {
        for size in ImageSize::ALL {
            let json = serde_json::to_value(size).unwrap();
            assert_eq!(json, size.as_str());
        }
        assert_eq!(ImageSize::default().as_str(), "portrait_4_3");
    }

    #[test]
    fn test_resolution_mode_round_trips_through_wire_name() {
        let parsed: ResolutionMode = serde_json::from_str("\"21:9\"").unwrap();
        assert_eq!(parsed, ResolutionMode::Ratio21x9);
        assert_eq!(ResolutionMode::default().as_str(), "match_input");
        assert!(serde_json::from_str::<ResolutionMode>("\"7:3\"").is_err());
    }

    #[test]
    fn test_create_input_shape() {
        let input = GenerationInput::create("a fox", ImageSize::Square, InferenceConfig::default())
            .with_lora("https://huggingface.co/x/pixel.safetensors");
        let json = serde_json::to_value(&input).unwrap();

        assert_eq!(json["prompt"], "a fox");
        assert_eq!(json["image_size"], "square");
        assert_eq!(json["num_inference_steps"], 30);
        assert_eq!(json["guidance_scale"], 2.5);
        assert_eq!(json["num_images"], 1);
        assert_eq!(json["enable_safety_checker"], true);
        assert_eq!(json["loras"][0]["scale"], 1.0);
        assert!(json.get("image_url").is_none());
        assert!(json.get("resolution_mode").is_none());
    }

    #[test]
    fn test_edit_input_shape() {
        let input = GenerationInput::edit(
            "make it lego",
            "https://example.com/in.png",
            ResolutionMode::MatchInput,
            InferenceConfig::default(),
        );
        let json = serde_json::to_value(&input).unwrap();

        assert_eq!(json["image_url"], "https://example.com/in.png");
        assert_eq!(json["resolution_mode"], "match_input");
        assert!(json.get("image_size").is_none());
        assert!(json.get("loras").is_none());
    }

    #[test]
    fn test_output_tolerates_missing_fields() {
        let output: GenerationOutput = serde_json::from_str("{}").unwrap();
        assert!(output.first_url().is_none());

        let output: GenerationOutput =
            serde_json::from_str(r#"{"images":[{"url":"https://v3.fal.media/a.jpg","width":512}]}"#)
                .unwrap();
        assert_eq!(output.first_url(), Some("https://v3.fal.media/a.jpg"));
    }

    #[test]
    fn test_output_reads_data_wrapped_images() {
        let output: GenerationOutput = serde_json::from_str(
            r#"{"data":{"images":[{"url":"https://v3.fal.media/x.jpg"}]},"requestId":"r1"}"#,
        )
        .unwrap();
        assert!(output.images.is_empty());
        assert_eq!(output.first_url(), Some("https://v3.fal.media/x.jpg"));

        let output: GenerationOutput = serde_json::from_str(
            r#"{"data":{"images":[]},"images":[{"url":"https://v3.fal.media/top.jpg"}]}"#,
        )
        .unwrap();
        assert_eq!(output.first_url(), Some("https://v3.fal.media/top.jpg"));
    }
}
