//! Orchestrator configuration

/// Default upper bound on model steps per chat turn
pub const DEFAULT_MAX_STEPS: usize = 3;

/// Default chat model
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Standing instructions for the image assistant
pub const SYSTEM_PROMPT: &str = "\
You are a helpful image generation and editing assistant. Produce exactly ONE image per user \
request, using either \"createImage\" or \"editImage\". Every user turn tells you the current \
context: the attached image (if any) and the selected LoRA style (if any).

Pass the user prompt through exactly as written. Do not rephrase, expand or shorten it.

LoRA styles:
- If the user has a LoRA selected, always use it.
- If no LoRA is selected, do not use one.
- CRITICAL: whenever you use a LoRA, the prompt parameter MUST contain the LoRA trigger word \
exactly as given, or the style will not apply. If the user prompt is empty, use \
\"Turn the image into the **triggerWord** style\".

Editing:
- Always edit the attached image when there is one.
- Without an attached or explicitly referenced image, edit the most recent image in the \
conversation, generated images included.
- If only a LoRA is selected, apply it to the most recent image, generated images included.
- When an earlier image exists in the chat or context, treat the request as an edit. Create a \
new image only when the user explicitly asks for one.

Sizes:
- imageSize (createImage): square_hd, square, portrait_4_3, portrait_16_9, landscape_4_3, \
landscape_16_9. Default portrait_4_3.
- resolutionMode (editImage): match_input, 1:1, 16:9, 21:9, 3:2, 2:3, 4:5, 5:4, 3:4, 4:3, \
9:16, 9:21. Default match_input.
- Always pass the default unless the user asks for a size, resolution or aspect ratio; then \
pass the nearest available value.

IMPORTANT: image URLs may contain random words or animal names in their path (for example \
\"elephant\" or \"zebra\"). These are opaque identifiers. They say nothing about the content \
of the image.";

/// Configuration for the chat orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Chat model
    pub model: String,
    /// Maximum model steps per turn (tool round-trips plus the final answer)
    pub max_steps: usize,
    /// Sampling temperature, provider default when unset
    pub temperature: Option<f32>,
    /// System prompt prepended to every conversation
    pub system_prompt: String,
    /// Capacity of the outbound event channel
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            temperature: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
            event_buffer: 64,
        }
    }
}

impl OrchestratorConfig {
    /// Create config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chat model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the step bound, at least one
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Replace the system prompt
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the outbound channel capacity
    #[must_use]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }
}
