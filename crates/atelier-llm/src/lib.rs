//! Atelier LLM - LLM Provider Abstraction
//!
//! This crate provides LLM integration for Atelier:
//! - Message / tool / completion types shared by every provider
//! - `LlmProvider`: streaming completion trait with tool calling
//! - OpenAI: chat completions via async-openai (text + vision)
//! - Mock: scripted provider for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod error;
pub mod message;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod tools;
pub mod util;

pub use completion::{
    CompletionRequest, CompletionResponse, CompletionStream, StreamChunk, TokenUsage,
    ToolCompletionRequest,
};
pub use error::{Error, Result};
pub use message::{ImageContent, Message, MessageRole};
pub use mock::MockProvider;
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::LlmProvider;
pub use tools::{ToolCall, ToolChoice, ToolDefinition};
