//! OpenAI - async-openai provider
//!
//! Streams chat completions (text, vision input and tool calls) using
//! async-openai 0.32+.

use crate::completion::{CompletionStream, StreamChunk, TokenUsage, ToolCompletionRequest};
use crate::error::{Error, Result};
use crate::message::{Message, MessageRole};
use crate::provider::LlmProvider;
use crate::tools::{ToolCall, ToolChoice, ToolDefinition};
use crate::util::mask_api_key;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionMessageToolCall, ChatCompletionMessageToolCallChunk,
        ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessage,
        ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
        ChatCompletionRequestMessageContentPartImage, ChatCompletionRequestMessageContentPartText,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
        ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, ChatCompletionResponseStream,
        ChatCompletionTool, ChatCompletionToolChoiceOption, ChatCompletionTools,
        CreateChatCompletionRequest, CreateChatCompletionStreamResponse, FinishReason,
        FunctionCall, FunctionObject, ImageUrl, ToolChoiceOptions,
    },
    Client,
};
use futures::StreamExt;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("api key")
        || lower.contains("apikey")
        || lower.contains("invalid key")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
    {
        return "API authentication error. Please check your API key configuration.".to_string();
    }

    if lower.contains("rate limit") || lower.contains("quota") {
        return "API rate limit exceeded. Please try again later.".to_string();
    }

    if lower.contains("internal") || lower.contains("server error") {
        return "API server error. Please try again later.".to_string();
    }

    if error.len() > 300 {
        format!("{}...(truncated)", crate::util::truncate_safe(error, 300))
    } else {
        error.to_string()
    }
}

fn map_openai_error(e: OpenAIError, timeout_ms: u64) -> Error {
    match e {
        OpenAIError::Reqwest(err) if err.is_timeout() => Error::Timeout(timeout_ms),
        OpenAIError::Reqwest(err) => Error::Network(sanitize_api_error(&err.to_string())),
        other => Error::Api(sanitize_api_error(&other.to_string())),
    }
}

/// Default chat model (vision and tool capable)
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Configuration for the OpenAI provider
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API key for authentication
    pub api_key: String,
    /// Optional custom base URL (for Azure OpenAI or proxies)
    pub base_url: Option<String>,
    /// Default model to use for completions
    pub default_model: String,
    /// Request timeout duration
    pub timeout: Duration,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiConfig {
    /// Creates a new configuration with the given API key
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Creates configuration from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_MODEL`.
    ///
    /// # Errors
    /// Returns error if `OPENAI_API_KEY` is not set
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::NotConfigured("OPENAI_API_KEY not set".to_string()))?;

        let mut config = Self::new(api_key);
        config.base_url = std::env::var("OPENAI_BASE_URL").ok();
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config.default_model = model;
        }
        Ok(config)
    }

    /// Sets a custom base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Sets the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// OpenAI API provider for streamed chat completions
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    default_model: String,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Creates a new provider with the given configuration
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        // The default async-openai client has no request timeout.
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(config.timeout),
            ..Default::default()
        };

        let client = Client::build(http_client, openai_config, backoff);

        Self {
            client,
            default_model: config.default_model,
            timeout: config.timeout,
        }
    }

    /// Creates a provider from environment variables
    ///
    /// # Errors
    /// Returns error if `OPENAI_API_KEY` is not set
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(OpenAiConfig::from_env()?))
    }

    fn convert_message(msg: Message) -> Result<ChatCompletionRequestMessage> {
        let message = match msg.role {
            MessageRole::System => ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(msg.content),
                name: None,
            }
            .into(),
            MessageRole::User => {
                if msg.images.is_empty() {
                    ChatCompletionRequestUserMessage {
                        content: ChatCompletionRequestUserMessageContent::Text(msg.content),
                        name: None,
                    }
                    .into()
                } else {
                    let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                            ChatCompletionRequestMessageContentPartText { text: msg.content },
                        ));
                    }
                    for img in msg.images {
                        parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                            ChatCompletionRequestMessageContentPartImage {
                                image_url: ImageUrl {
                                    url: img.url,
                                    detail: None,
                                },
                            },
                        ));
                    }
                    ChatCompletionRequestUserMessage {
                        content: ChatCompletionRequestUserMessageContent::Array(parts),
                        name: None,
                    }
                    .into()
                }
            }
            MessageRole::Assistant => {
                let tool_calls = if msg.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        msg.tool_calls
                            .into_iter()
                            .map(|call| {
                                ChatCompletionMessageToolCalls::Function(
                                    ChatCompletionMessageToolCall {
                                        id: call.id,
                                        function: FunctionCall {
                                            name: call.name,
                                            arguments: call.arguments,
                                        },
                                    },
                                )
                            })
                            .collect(),
                    )
                };
                let content = if msg.content.is_empty() && tool_calls.is_some() {
                    None
                } else {
                    Some(ChatCompletionRequestAssistantMessageContent::Text(
                        msg.content,
                    ))
                };

                #[allow(deprecated)]
                ChatCompletionRequestAssistantMessage {
                    content,
                    name: None,
                    tool_calls,
                    function_call: None,
                    refusal: None,
                    audio: None,
                }
                .into()
            }
            MessageRole::Tool => {
                let tool_call_id = msg.tool_call_id.ok_or_else(|| {
                    Error::InvalidResponse("Tool message missing tool_call_id".to_string())
                })?;
                ChatCompletionRequestToolMessage {
                    content: ChatCompletionRequestToolMessageContent::Text(msg.content),
                    tool_call_id,
                }
                .into()
            }
        };
        Ok(message)
    }

    fn convert_tool(tool: ToolDefinition) -> ChatCompletionTool {
        ChatCompletionTool {
            function: FunctionObject {
                name: tool.name,
                description: Some(tool.description),
                parameters: Some(tool.parameters),
                strict: None,
            },
        }
    }

    fn convert_tool_choice(choice: &ToolChoice) -> ChatCompletionToolChoiceOption {
        match choice {
            ToolChoice::Auto => ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto),
            ToolChoice::None => ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::None),
            ToolChoice::Required => {
                ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Required)
            }
        }
    }

    fn build_request(&self, request: ToolCompletionRequest) -> Result<CreateChatCompletionRequest> {
        let model = if request.request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.request.model
        };

        let messages: Vec<ChatCompletionRequestMessage> = request
            .request
            .messages
            .into_iter()
            .map(Self::convert_message)
            .collect::<Result<_>>()?;

        let (tools, tool_choice) = if request.tools.is_empty() {
            (None, None)
        } else {
            let tools: Vec<ChatCompletionTools> = request
                .tools
                .into_iter()
                .map(|tool| ChatCompletionTools::Function(Self::convert_tool(tool)))
                .collect();
            (
                Some(tools),
                Some(Self::convert_tool_choice(&request.tool_choice)),
            )
        };

        Ok(CreateChatCompletionRequest {
            model,
            messages,
            tools,
            tool_choice,
            max_completion_tokens: request.request.max_tokens,
            temperature: request.request.temperature,
            stream: Some(true),
            ..Default::default()
        })
    }
}

fn finish_reason_str(reason: &FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::ToolCalls => "tool_calls",
        FinishReason::ContentFilter => "content_filter",
        FinishReason::FunctionCall => "function_call",
        #[allow(unreachable_patterns)]
        _ => "other",
    }
}

/// Reassembles tool calls whose id, name and arguments arrive split across
/// stream deltas, keyed by the delta index.
#[derive(Debug, Default)]
pub(crate) struct ToolCallAccumulator {
    partial: BTreeMap<u32, ToolCall>,
}

impl ToolCallAccumulator {
    pub(crate) fn push(
        &mut self,
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    ) {
        let entry = self
            .partial
            .entry(index)
            .or_insert_with(|| ToolCall::new("", "", ""));
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            entry.id = id;
        }
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            entry.name = name;
        }
        if let Some(arguments) = arguments {
            entry.arguments.push_str(&arguments);
        }
    }

    /// Drain completed calls in index order; calls without a name are dropped.
    pub(crate) fn drain(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.partial)
            .into_values()
            .filter(|call| {
                if call.name.is_empty() {
                    warn!(id = %call.id, "Dropping streamed tool call without a name");
                    false
                } else {
                    true
                }
            })
            .collect()
    }
}

struct StreamState {
    upstream: ChatCompletionResponseStream,
    tool_calls: ToolCallAccumulator,
    queue: VecDeque<StreamChunk>,
    usage: Option<TokenUsage>,
    finished: bool,
}

impl StreamState {
    fn absorb(&mut self, response: CreateChatCompletionStreamResponse) {
        if let Some(u) = response.usage {
            self.usage = Some(TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });
        }

        for choice in response.choices {
            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    self.queue.push_back(StreamChunk::TextDelta(text));
                }
            }
            if let Some(chunks) = choice.delta.tool_calls {
                for ChatCompletionMessageToolCallChunk {
                    index, id, function, ..
                } in chunks
                {
                    let (name, arguments) = function
                        .map(|f| (f.name, f.arguments))
                        .unwrap_or((None, None));
                    self.tool_calls.push(index, id, name, arguments);
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish(Some(finish_reason_str(&reason).to_string()));
            }
        }
    }

    fn finish(&mut self, finish_reason: Option<String>) {
        for call in self.tool_calls.drain() {
            self.queue.push_back(StreamChunk::ToolCall(call));
        }
        self.queue.push_back(StreamChunk::Finish {
            finish_reason,
            usage: self.usage.take(),
        });
        self.finished = true;
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.request.model, tools = request.tools.len()))]
    async fn stream(&self, request: ToolCompletionRequest) -> Result<CompletionStream> {
        let openai_request = self.build_request(request)?;
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);

        debug!("Opening OpenAI completion stream");

        let upstream = self
            .client
            .chat()
            .create_stream(openai_request)
            .await
            .map_err(|e| map_openai_error(e, timeout_ms))?;

        let state = StreamState {
            upstream,
            tool_calls: ToolCallAccumulator::default(),
            queue: VecDeque::new(),
            usage: None,
            finished: false,
        };

        let stream = futures::stream::unfold(state, move |mut state| async move {
            loop {
                if let Some(chunk) = state.queue.pop_front() {
                    return Some((Ok(chunk), state));
                }
                if state.finished {
                    return None;
                }
                match state.upstream.next().await {
                    Some(Ok(response)) => state.absorb(response),
                    Some(Err(e)) => {
                        state.finished = true;
                        let err = match map_openai_error(e, timeout_ms) {
                            Error::Api(message) => Error::Stream(message),
                            other => other,
                        };
                        return Some((Err(err), state));
                    }
                    None => state.finish(None),
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
