//! Generation - per-tool-call image generation state machine
//!
//! One call to [`run_generation`] drives one provider stream:
//!
//! ```text
//! starting -> generating* -> uploading -> completed
//!     \            \             \
//!      `------------`-------------`----> error
//! ```
//!
//! Every status change is emitted as a `data-image-generation` event keyed by
//! the tool call id. A [`GenerationTask`] refuses backward transitions and any
//! transition out of a terminal state, so nothing follows `completed` or
//! `error`.

use crate::error::{Error, Result};
use crate::registry::ToolContext;
use crate::status::{GenerationStatus, GenerationStatusKind};
use atelier_imaging::{
    GenerationInput, GenerationKind, ImageSize, InferenceConfig, ResolutionMode,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Message shown when the provider rejects the credential
pub const INVALID_API_KEY_MESSAGE: &str =
    "Invalid API key. Please check your FAL API key in settings and try again.";

/// Message shown when the client went away mid-generation
pub const GENERATION_CANCELLED_MESSAGE: &str = "Generation cancelled";

/// Substrings that mark an authentication failure in unstructured errors
const AUTH_FAILURE_MARKERS: &[&str] = &["401", "Unauthorized", "Invalid API key"];

/// Default text-to-image endpoint
pub const DEFAULT_CREATE_ENDPOINT: &str = "fal-ai/flux-kontext-lora/text-to-image";

/// Default image-to-image endpoint
pub const DEFAULT_EDIT_ENDPOINT: &str = "fal-ai/flux-kontext-lora";

/// Provider endpoints and sampler settings
#[derive(Debug, Clone, PartialEq)]
pub struct ImagingSettings {
    /// Endpoint for `create`
    pub create_endpoint: String,
    /// Endpoint for `edit`
    pub edit_endpoint: String,
    /// Sampler settings sent with every request
    pub inference: InferenceConfig,
}

impl Default for ImagingSettings {
    fn default() -> Self {
        Self {
            create_endpoint: DEFAULT_CREATE_ENDPOINT.to_string(),
            edit_endpoint: DEFAULT_EDIT_ENDPOINT.to_string(),
            inference: InferenceConfig::default(),
        }
    }
}

impl ImagingSettings {
    /// Endpoint serving `kind`
    #[must_use]
    pub fn endpoint_for(&self, kind: GenerationKind) -> &str {
        match kind {
            GenerationKind::Create => &self.create_endpoint,
            GenerationKind::Edit => &self.edit_endpoint,
        }
    }
}

/// What a tool asked to generate
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Prompt passed to the provider
    pub prompt: String,
    /// Create or edit
    pub kind: GenerationKind,
    /// Source image (edit only)
    pub source_image_url: Option<String>,
    /// Output size (create only)
    pub image_size: Option<ImageSize>,
    /// Output resolution (edit only)
    pub resolution_mode: Option<ResolutionMode>,
    /// Optional style adapter
    pub lora_url: Option<String>,
}

impl GenerationRequest {
    /// Text-to-image request
    #[must_use]
    pub fn create(prompt: impl Into<String>, size: ImageSize, lora_url: Option<String>) -> Self {
        Self {
            prompt: prompt.into(),
            kind: GenerationKind::Create,
            source_image_url: None,
            image_size: Some(size),
            resolution_mode: None,
            lora_url,
        }
    }

    /// Image-to-image request
    #[must_use]
    pub fn edit(
        prompt: impl Into<String>,
        image_url: impl Into<String>,
        mode: ResolutionMode,
        lora_url: Option<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            kind: GenerationKind::Edit,
            source_image_url: Some(image_url.into()),
            image_size: None,
            resolution_mode: Some(mode),
            lora_url,
        }
    }

    /// Provider input for this request
    #[must_use]
    pub fn to_input(&self, inference: &InferenceConfig) -> GenerationInput {
        let input = match self.kind {
            GenerationKind::Create => GenerationInput::create(
                self.prompt.clone(),
                self.image_size.unwrap_or_default(),
                inference.clone(),
            ),
            GenerationKind::Edit => GenerationInput::edit(
                self.prompt.clone(),
                self.source_image_url.clone().unwrap_or_default(),
                self.resolution_mode.unwrap_or_default(),
                inference.clone(),
            ),
        };
        match &self.lora_url {
            Some(url) => input.with_lora(url.clone()),
            None => input,
        }
    }
}

/// Tool result of a successful generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    /// Prompt used
    pub prompt: String,
    /// Durable image URL
    pub image_url: String,
}

/// Live state of one generation, keyed by tool call id
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTask {
    /// Tool call id
    pub tool_call_id: String,
    /// Prompt used
    pub prompt: String,
    /// Create or edit
    pub kind: GenerationKind,
    /// Source image (edit only)
    pub source_image_url: Option<String>,
    /// Current status
    pub status: GenerationStatusKind,
    /// Latest preview
    pub streaming_image: Option<String>,
    /// Durable result
    pub final_image: Option<String>,
    /// Failure message
    pub error: Option<String>,
}

impl GenerationTask {
    /// New task in `starting`
    #[must_use]
    pub fn new(tool_call_id: impl Into<String>, request: &GenerationRequest) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            prompt: request.prompt.clone(),
            kind: request.kind,
            source_image_url: request.source_image_url.clone(),
            status: GenerationStatusKind::Starting,
            streaming_image: None,
            final_image: None,
            error: None,
        }
    }

    /// Move to `next`
    ///
    /// Staying in the same non-terminal status is allowed (repeated previews).
    ///
    /// # Errors
    /// `InvalidTransition` when leaving a terminal status or moving backwards.
    pub fn transition(&mut self, next: GenerationStatusKind) -> Result<()> {
        if self.status.is_terminal() || next.rank() < self.status.rank() {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Record a preview while generating
    pub fn preview(&mut self, url: impl Into<String>) -> Result<()> {
        self.transition(GenerationStatusKind::Generating)?;
        self.streaming_image = Some(url.into());
        Ok(())
    }

    /// Record the durable result
    pub fn complete(&mut self, final_image: impl Into<String>) -> Result<()> {
        self.transition(GenerationStatusKind::Completed)?;
        self.final_image = Some(final_image.into());
        Ok(())
    }

    /// Record a failure
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(GenerationStatusKind::Error)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Event payload for the current status
    #[must_use]
    pub fn snapshot(&self) -> GenerationStatus {
        let streaming_image = match self.status {
            GenerationStatusKind::Generating | GenerationStatusKind::Uploading => {
                self.streaming_image.clone()
            }
            _ => None,
        };
        GenerationStatus {
            status: self.status,
            prompt: self.prompt.clone(),
            kind: self.kind,
            streaming_image,
            final_image: self.final_image.clone(),
            error: self.error.clone(),
        }
    }
}

/// Whether `err` means the provider rejected the credential
///
/// Structured `Unauthorized` errors are authoritative; otherwise the message
/// is matched against well-known markers.
#[must_use]
pub fn is_auth_failure(err: &Error) -> bool {
    match err {
        Error::Imaging(imaging) if imaging.is_unauthorized() => return true,
        // Fetch errors embed arbitrary URLs and concern the image host, not the key.
        Error::Imaging(
            atelier_imaging::Error::Fetch { .. } | atelier_imaging::Error::FetchTimeout { .. },
        ) => return false,
        _ => {}
    }
    let message = err.to_string();
    AUTH_FAILURE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// User-facing message for a failed generation
#[must_use]
pub fn failure_message(kind: GenerationKind, err: &Error) -> String {
    if matches!(err, Error::Cancelled | Error::Closed) {
        return GENERATION_CANCELLED_MESSAGE.to_string();
    }
    if is_auth_failure(err) {
        return INVALID_API_KEY_MESSAGE.to_string();
    }
    let action = match kind {
        GenerationKind::Create => "generating",
        GenerationKind::Edit => "editing",
    };
    format!("Error {action} image: {err}")
}

/// Run one generation to completion, emitting every status change
///
/// # Errors
/// `Error::Generation` with the user-facing message; the same message has
/// already been emitted as an `error` status and a top-level `error` event.
pub async fn run_generation(
    ctx: &ToolContext,
    settings: &ImagingSettings,
    request: GenerationRequest,
) -> Result<GenerationOutcome> {
    let mut task = GenerationTask::new(&ctx.tool_call_id, &request);
    info!(
        tool_call_id = %ctx.tool_call_id,
        kind = %request.kind,
        "Starting image generation"
    );

    let result = match ctx
        .emitter
        .generation_status(&ctx.tool_call_id, task.snapshot())
        .await
    {
        Ok(()) => drive(ctx, settings, &request, &mut task).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(image_url) => Ok(GenerationOutcome {
            prompt: request.prompt,
            image_url,
        }),
        Err(err) => {
            let message = failure_message(request.kind, &err);
            warn!(
                tool_call_id = %ctx.tool_call_id,
                status = ?task.status,
                error = %err,
                "Image generation failed"
            );
            if task.fail(message.clone()).is_ok() {
                // The client may already be gone; nothing left to tell it.
                let _ = ctx
                    .emitter
                    .generation_status(&ctx.tool_call_id, task.snapshot())
                    .await;
                let _ = ctx.emitter.error(message.clone()).await;
            }
            Err(Error::Generation(message))
        }
    }
}

async fn drive(
    ctx: &ToolContext,
    settings: &ImagingSettings,
    request: &GenerationRequest,
    task: &mut GenerationTask,
) -> Result<String> {
    let input = request.to_input(&settings.inference);
    let endpoint = settings.endpoint_for(request.kind);

    let mut stream = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
        opened = ctx.imaging.stream(endpoint, &input) => opened?,
    };
    task.transition(GenerationStatusKind::Generating)?;
    debug!(tool_call_id = %ctx.tool_call_id, endpoint = %endpoint, "Provider stream open");

    loop {
        let event = tokio::select! {
            biased;
            // Dropping `stream` here aborts the provider request.
            _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            event = stream.next_event() => event,
        };
        let Some(event) = event else { break };
        let output = event?;
        if let Some(url) = output.first_url() {
            task.preview(url)?;
            ctx.emitter
                .generation_status(&ctx.tool_call_id, task.snapshot())
                .await?;
        }
    }

    let output = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
        done = stream.done() => done?,
    };
    let result_url = output.first_url().ok_or(Error::NoImage)?.to_string();

    task.transition(GenerationStatusKind::Uploading)?;
    ctx.emitter
        .generation_status(&ctx.tool_call_id, task.snapshot())
        .await?;

    let final_url = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
        stored = ctx.imaging.persist(&result_url) => stored?,
    };

    task.complete(final_url.clone())?;
    ctx.emitter
        .generation_status(&ctx.tool_call_id, task.snapshot())
        .await?;

    info!(tool_call_id = %ctx.tool_call_id, "Image generation completed");
    Ok(final_url)
}

#[cfg(test)]
mod tests;
