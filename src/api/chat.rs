//! Chat endpoint
//!
//! `POST /api/chat` runs one chat turn and streams it back as a UI message
//! stream over SSE. The credential gate runs before anything is streamed,
//! so quota and bot rejections are plain HTTP errors.

use super::{ApiError, AppState};
use crate::middleware::CallerIdentity;
use atelier_core::ChatMessage;
use atelier_tools::{StatusEmitter, UiEvent};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderName,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

/// Response header announcing the stream protocol
pub const UI_MESSAGE_STREAM_HEADER: HeaderName =
    HeaderName::from_static("x-vercel-ai-ui-message-stream");

/// Final SSE frame
pub const DONE_MARKER: &str = "[DONE]";

/// Chat request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Caller's own image provider key
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Create chat routes
pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/api/chat", post(chat))
}

async fn chat(
    State(state): State<AppState>,
    CallerIdentity(identity): CallerIdentity,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;

    let handle = state
        .gate
        .authorize(request.api_key.as_deref(), &identity)
        .await?;

    info!(
        identity = %identity,
        key_source = ?handle.source,
        messages = request.messages.len(),
        "Chat turn accepted"
    );

    let cancel = CancellationToken::new();
    let (emitter, rx) =
        StatusEmitter::channel(state.orchestrator.config().event_buffer, cancel.clone());

    let orchestrator = state.orchestrator.clone();
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator
            .run(&request.messages, handle.client, emitter, task_cancel)
            .await
        {
            debug!(error = %e, "Chat turn ended early");
        }
    });

    let sse = Sse::new(event_stream(rx, cancel.drop_guard()));
    Ok(([(UI_MESSAGE_STREAM_HEADER, "v1")], sse).into_response())
}

/// Frame every event as `data: <json>`, then `data: [DONE]`
///
/// The drop guard lives as long as the response body; a client disconnect
/// drops it and cancels the turn.
fn event_stream(
    rx: mpsc::Receiver<UiEvent>,
    guard: DropGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold(Some((rx, guard)), |state| async move {
        let Some((mut rx, guard)) = state else {
            return None;
        };
        match rx.recv().await {
            Some(event) => Some((Ok(frame(&event)), Some((rx, guard)))),
            None => Some((Ok(Event::default().data(DONE_MARKER)), None)),
        }
    })
}

fn frame(event: &UiEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            warn!(kind = event.kind(), error = %e, "Failed to serialize stream event");
            let fallback = serde_json::json!({
                "type": "error",
                "errorText": "Failed to serialize stream event",
            });
            Event::default().data(fallback.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_request_accepts_camel_case_key() {
        let request: ChatRequest = serde_json::from_value(serde_json::json!({
            "messages": [{"id": "m1", "role": "user", "parts": [{"type": "text", "text": "hi"}]}],
            "apiKey": "fal-own-key"
        }))
        .unwrap();
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.api_key.as_deref(), Some("fal-own-key"));

        let request: ChatRequest = serde_json::from_str(r#"{"messages": []}"#).unwrap();
        assert!(request.api_key.is_none());
    }

    #[tokio::test]
    async fn test_stream_ends_with_done() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        tx.send(UiEvent::StartStep).await.unwrap();
        drop(tx);

        let frames: Vec<_> = event_stream(rx, cancel.clone().drop_guard())
            .collect()
            .await;
        assert_eq!(frames.len(), 2);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_turn() {
        let cancel = CancellationToken::new();
        let (_tx, rx) = mpsc::channel::<UiEvent>(4);

        let stream = event_stream(rx, cancel.clone().drop_guard());
        assert!(!cancel.is_cancelled());
        drop(stream);
        assert!(cancel.is_cancelled());
    }
}
