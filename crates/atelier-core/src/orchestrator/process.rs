//! Orchestrator main loop
//!
//! Contains `run` - one chat turn from `start` to `finish`.

use super::ChatOrchestrator;
use crate::error::{Error, Result, UserFriendlyError};
use crate::normalizer::{normalize_messages, to_model_messages, ChatMessage};
use atelier_imaging::ImagingClient;
use atelier_llm::{
    CompletionRequest, CompletionResponse, Message, StreamChunk, ToolCompletionRequest,
    ToolDefinition,
};
use atelier_tools::{StatusEmitter, UiEvent};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

impl ChatOrchestrator {
    /// Run one chat turn, writing every event to `emitter`
    ///
    /// Model and tool failures are reported on the stream and the turn still
    /// ends with `finish`.
    ///
    /// # Errors
    ///
    /// `Error::Cancelled` when `cancel` fires or the outbound stream closes.
    #[tracing::instrument(skip_all, fields(messages = messages.len()))]
    pub async fn run(
        &self,
        messages: &[ChatMessage],
        client: Arc<dyn ImagingClient>,
        emitter: StatusEmitter,
        cancel: CancellationToken,
    ) -> Result<()> {
        let message_id = Uuid::new_v4().to_string();
        info!(message_id = %message_id, model = %self.config.model, "Starting chat turn");

        let result = match self.drive(&message_id, messages, &client, &emitter, &cancel).await {
            Ok(steps) => {
                debug!(message_id = %message_id, steps, "Chat turn finished");
                emitter.emit(UiEvent::Finish).await.map_err(Error::from)
            }
            Err(e) if is_disconnect(&e) => Err(e),
            Err(e) => {
                error!(message_id = %message_id, error = %e, "Chat turn failed");
                report_failure(&emitter, &e).await
            }
        };

        result.map_err(|e| {
            if is_disconnect(&e) {
                debug!(message_id = %message_id, "Client went away, turn abandoned");
                Error::Cancelled
            } else {
                e
            }
        })
    }

    async fn drive(
        &self,
        message_id: &str,
        messages: &[ChatMessage],
        client: &Arc<dyn ImagingClient>,
        emitter: &StatusEmitter,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        emitter
            .emit(UiEvent::Start {
                message_id: message_id.to_string(),
            })
            .await?;

        let normalized = normalize_messages(messages)?;
        let mut conversation = Vec::with_capacity(normalized.len() + 1);
        conversation.push(Message::system(&self.config.system_prompt));
        conversation.extend(to_model_messages(&normalized));

        let tools = self.registry.to_llm_tools();

        for step in 1..=self.config.max_steps {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            emitter.emit(UiEvent::StartStep).await?;
            let response = self
                .stream_step(step, &conversation, &tools, emitter, cancel)
                .await?;
            emitter.emit(UiEvent::FinishStep).await?;

            if !response.has_tool_calls() {
                return Ok(step);
            }

            conversation.push(Message::assistant_with_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            for call in &response.tool_calls {
                let result = self
                    .execute_tool_call(call, client, emitter, cancel)
                    .await?;
                conversation.push(result);
            }
        }

        warn!(
            max_steps = self.config.max_steps,
            "Step limit reached, ending turn after tool results"
        );
        Ok(self.config.max_steps)
    }

    /// Stream one model step, forwarding text as it arrives
    async fn stream_step(
        &self,
        step: usize,
        conversation: &[Message],
        tools: &[ToolDefinition],
        emitter: &StatusEmitter,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse> {
        let mut request =
            CompletionRequest::new(&self.config.model).with_messages(conversation.to_vec());
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        let request = ToolCompletionRequest::new(request, tools.to_vec());

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            opened = self.provider.stream(request) => opened?,
        };

        let text_id = Uuid::new_v4().to_string();
        let mut text_open = false;
        let mut response = CompletionResponse::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };

            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    if text_open {
                        emitter.emit(UiEvent::TextEnd { id: text_id }).await?;
                    }
                    return Err(e.into());
                }
            };

            if let StreamChunk::TextDelta(delta) = &chunk {
                if !delta.is_empty() {
                    if !text_open {
                        emitter
                            .emit(UiEvent::TextStart {
                                id: text_id.clone(),
                            })
                            .await?;
                        text_open = true;
                    }
                    emitter
                        .emit(UiEvent::TextDelta {
                            id: text_id.clone(),
                            delta: delta.clone(),
                        })
                        .await?;
                }
            }
            response.absorb(chunk);
        }

        if text_open {
            emitter.emit(UiEvent::TextEnd { id: text_id }).await?;
        }

        debug!(
            step,
            tool_calls = response.tool_calls.len(),
            finish_reason = ?response.finish_reason,
            "Model step finished"
        );
        Ok(response)
    }
}

/// Tell the client why the turn failed, then close the message
async fn report_failure(emitter: &StatusEmitter, err: &Error) -> Result<()> {
    emitter.error(err.user_message()).await?;
    emitter.emit(UiEvent::Finish).await?;
    Ok(())
}

fn is_disconnect(err: &Error) -> bool {
    matches!(
        err,
        Error::Cancelled | Error::Tool(atelier_tools::Error::Closed)
    )
}
