//! Mock LLM Provider for testing
//!
//! Replays scripted chunk sequences, one script per `stream` call, and
//! records every request it receives.

use crate::completion::{CompletionStream, StreamChunk, ToolCompletionRequest};
use crate::error::{Error, Result};
use crate::provider::LlmProvider;
use crate::tools::ToolCall;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

enum Script {
    Chunks(Vec<StreamChunk>),
    Fail(String),
}

/// A mock LLM provider that streams queued scripts or a default reply.
#[derive(Clone, Default)]
pub struct MockProvider {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    requests: Arc<Mutex<Vec<ToolCompletionRequest>>>,
}

impl MockProvider {
    /// Create a new mock provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chunk sequence for the next `stream` call.
    pub fn push_chunks(&self, chunks: Vec<StreamChunk>) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Script::Chunks(chunks));
    }

    /// Queue a plain text reply ending with `stop`.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push_chunks(vec![
            StreamChunk::TextDelta(text.into()),
            StreamChunk::Finish {
                finish_reason: Some("stop".to_string()),
                usage: None,
            },
        ]);
    }

    /// Queue a turn that requests the given tool calls.
    pub fn push_tool_calls(&self, calls: Vec<ToolCall>) {
        let mut chunks: Vec<StreamChunk> = calls.into_iter().map(StreamChunk::ToolCall).collect();
        chunks.push(StreamChunk::Finish {
            finish_reason: Some("tool_calls".to_string()),
            usage: None,
        });
        self.push_chunks(chunks);
    }

    /// Make the next `stream` call fail before producing any chunk.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Script::Fail(message.into()));
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<ToolCompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn stream(&self, request: ToolCompletionRequest) -> Result<CompletionStream> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        let chunks = match script {
            Some(Script::Chunks(chunks)) => chunks,
            Some(Script::Fail(message)) => return Err(Error::Api(message)),
            None => vec![
                StreamChunk::TextDelta("mock response".to_string()),
                StreamChunk::Finish {
                    finish_reason: Some("stop".to_string()),
                    usage: None,
                },
            ],
        };

        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionRequest;

    #[tokio::test]
    async fn test_scripts_are_replayed_in_order() {
        let mock = MockProvider::new();
        mock.push_tool_calls(vec![ToolCall::new("call_1", "createImage", "{}")]);
        mock.push_text("Here is your image.");

        let first = mock
            .complete(CompletionRequest::new("").into())
            .await
            .unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        assert_eq!(first.model, "mock-model");

        let second = mock
            .complete(CompletionRequest::new("").into())
            .await
            .unwrap();
        assert_eq!(second.content, "Here is your image.");
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_script() {
        let mock = MockProvider::new();
        mock.push_failure("boom");
        let err = mock
            .complete(CompletionRequest::new("").into())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_default_reply_when_queue_empty() {
        let mock = MockProvider::new();
        let response = mock
            .complete(CompletionRequest::new("").into())
            .await
            .unwrap();
        assert_eq!(response.content, "mock response");
    }
}
