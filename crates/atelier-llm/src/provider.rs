//! LLM Provider trait definition
//!
//! This module defines the core trait that all LLM providers must implement.

use crate::completion::{CompletionResponse, CompletionStream, ToolCompletionRequest};
use crate::error::Result;
use futures::StreamExt;

/// Trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Start a streamed completion; tools may be empty
    async fn stream(&self, request: ToolCompletionRequest) -> Result<CompletionStream>;

    /// Complete a conversation, collecting the stream
    async fn complete(&self, request: ToolCompletionRequest) -> Result<CompletionResponse> {
        let model = if request.request.model.is_empty() {
            self.default_model().to_string()
        } else {
            request.request.model.clone()
        };

        let mut stream = self.stream(request).await?;
        let mut response = CompletionResponse {
            model,
            ..Default::default()
        };
        while let Some(chunk) = stream.next().await {
            response.absorb(chunk?);
        }
        Ok(response)
    }
}
