//! Completion request and response types
//!
//! This module defines the types for LLM completion requests, streamed
//! chunks, and collected responses.

use crate::error::Result;
use crate::message::Message;
use crate::tools::{ToolCall, ToolChoice, ToolDefinition};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

/// Completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Model to use (provider-specific, empty means provider default)
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a new completion request
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Add a message
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add messages
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Request with tools
#[derive(Debug, Clone)]
pub struct ToolCompletionRequest {
    /// Base completion request
    pub request: CompletionRequest,
    /// Available tools (may be empty)
    pub tools: Vec<ToolDefinition>,
    /// Tool choice strategy
    pub tool_choice: ToolChoice,
}

impl ToolCompletionRequest {
    /// Create a new tool completion request
    #[must_use]
    pub fn new(request: CompletionRequest, tools: Vec<ToolDefinition>) -> Self {
        Self {
            request,
            tools,
            tool_choice: ToolChoice::Auto,
        }
    }

    /// Set tool choice
    #[must_use]
    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }
}

impl From<CompletionRequest> for ToolCompletionRequest {
    fn from(request: CompletionRequest) -> Self {
        Self::new(request, Vec::new())
    }
}

/// One increment of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// A fragment of assistant text
    TextDelta(String),
    /// A fully assembled tool call (arguments complete)
    ToolCall(ToolCall),
    /// The model finished this turn
    Finish {
        /// Provider finish reason (e.g. "stop", "tool_calls")
        finish_reason: Option<String>,
        /// Token usage, when the provider reports it
        usage: Option<TokenUsage>,
    },
}

/// Stream of completion chunks
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Collected completion response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,
    /// Tool calls requested
    pub tool_calls: Vec<ToolCall>,
    /// Token usage
    pub usage: Option<TokenUsage>,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Model used
    pub model: String,
}

impl CompletionResponse {
    /// Check if the response has tool calls
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Fold a chunk into the response
    pub fn absorb(&mut self, chunk: StreamChunk) {
        match chunk {
            StreamChunk::TextDelta(text) => self.content.push_str(&text),
            StreamChunk::ToolCall(call) => self.tool_calls.push(call),
            StreamChunk::Finish {
                finish_reason,
                usage,
            } => {
                self.finish_reason = finish_reason;
                self.usage = usage;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new("gpt-4.1-mini")
            .with_message(Message::system("You are helpful"))
            .with_message(Message::user("Hello"))
            .with_max_tokens(100)
            .with_temperature(0.7);

        assert_eq!(request.model, "gpt-4.1-mini");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.max_tokens, Some(100));
        assert_eq!(request.temperature, Some(0.7));
    }

    #[test]
    fn test_tool_request_from_plain_request() {
        let request: ToolCompletionRequest = CompletionRequest::new("m").into();
        assert!(request.tools.is_empty());
        assert!(matches!(request.tool_choice, ToolChoice::Auto));
    }

    #[test]
    fn test_response_absorbs_chunks_in_order() {
        let mut response = CompletionResponse::default();
        response.absorb(StreamChunk::TextDelta("A fox ".into()));
        response.absorb(StreamChunk::TextDelta("in snow".into()));
        response.absorb(StreamChunk::ToolCall(ToolCall::new(
            "call_1",
            "createImage",
            r#"{"prompt":"fox"}"#,
        )));
        response.absorb(StreamChunk::Finish {
            finish_reason: Some("tool_calls".into()),
            usage: None,
        });

        assert_eq!(response.content, "A fox in snow");
        assert!(response.has_tool_calls());
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
    }
}
