//! Tool execution
//!
//! One model tool call becomes `tool-input-available`, the tool run, and
//! either `tool-output-available` or `tool-output-error`. The returned
//! message carries the result (or the failure) back to the model.

use super::ChatOrchestrator;
use crate::error::{Error, Result};
use atelier_imaging::ImagingClient;
use atelier_llm::{Message, ToolCall};
use atelier_tools::{StatusEmitter, ToolContext, UiEvent};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

impl ChatOrchestrator {
    pub(super) async fn execute_tool_call(
        &self,
        call: &ToolCall,
        client: &Arc<dyn ImagingClient>,
        emitter: &StatusEmitter,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        let input = match call.arguments_value() {
            Ok(input) => input,
            Err(e) => {
                warn!(tool = %call.name, tool_call_id = %call.id, error = %e, "Unparseable tool arguments");
                emitter
                    .emit(UiEvent::ToolInputAvailable {
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        input: Value::String(call.arguments.clone()),
                    })
                    .await?;
                return tool_failed(call, format!("invalid input: {}", e), emitter).await;
            }
        };

        emitter
            .emit(UiEvent::ToolInputAvailable {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                input: input.clone(),
            })
            .await?;

        let mut ctx = ToolContext::new(&call.id, emitter.clone(), client.clone());
        ctx.cancel = cancel.clone();

        match self.registry.execute(&call.name, ctx, input).await {
            Ok(output) => {
                debug!(tool = %call.name, tool_call_id = %call.id, "Tool succeeded");
                emitter
                    .emit(UiEvent::ToolOutputAvailable {
                        tool_call_id: call.id.clone(),
                        output: output.clone(),
                    })
                    .await?;
                Ok(Message::tool_response(&call.id, output.to_string()))
            }
            Err(atelier_tools::Error::Closed) => Err(Error::Cancelled),
            Err(_) if cancel.is_cancelled() => Err(Error::Cancelled),
            Err(e) => tool_failed(call, e.to_string(), emitter).await,
        }
    }
}

/// Report a failed call and hand the failure to the model as the tool result
async fn tool_failed(call: &ToolCall, error_text: String, emitter: &StatusEmitter) -> Result<Message> {
    warn!(tool = %call.name, tool_call_id = %call.id, error = %error_text, "Tool failed");
    let content = json!({ "error": error_text }).to_string();
    emitter
        .emit(UiEvent::ToolOutputError {
            tool_call_id: call.id.clone(),
            error_text,
        })
        .await?;
    Ok(Message::tool_response(&call.id, content))
}
