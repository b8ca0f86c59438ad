use super::*;
use crate::status::{StatusEmitter, UiEvent};
use async_trait::async_trait;
use atelier_imaging::{
    GenerationInput, GenerationOutput, GenerationStream, ImagingClient, ScriptedImagingClient,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn setup() -> (ToolContext, ScriptedImagingClient, mpsc::Receiver<UiEvent>) {
    let client = ScriptedImagingClient::new();
    let (emitter, rx) = StatusEmitter::channel(64, CancellationToken::new());
    let ctx = ToolContext::new("call_1", emitter, Arc::new(client.clone()));
    (ctx, client, rx)
}

fn drain(rx: &mut mpsc::Receiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn statuses(events: &[UiEvent]) -> Vec<GenerationStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::DataImageGeneration { data, .. } => Some(data.clone()),
            _ => None,
        })
        .collect()
}

fn status_kinds(events: &[UiEvent]) -> Vec<GenerationStatusKind> {
    statuses(events).into_iter().map(|s| s.status).collect()
}

fn top_level_errors(events: &[UiEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::Error { error_text } => Some(error_text.clone()),
            _ => None,
        })
        .collect()
}

fn create_request() -> GenerationRequest {
    GenerationRequest::create("a red fox in snow", ImageSize::default(), None)
}

// ============================================================================
// State machine
// ============================================================================

#[test]
fn test_task_rejects_backward_and_terminal_transitions() {
    let mut task = GenerationTask::new("call_1", &create_request());
    assert_eq!(task.status, GenerationStatusKind::Starting);

    task.preview("https://cdn/1.jpg").unwrap();
    task.preview("https://cdn/2.jpg").unwrap();
    task.transition(GenerationStatusKind::Uploading).unwrap();

    let err = task.transition(GenerationStatusKind::Generating).unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    task.complete("https://store/final.jpg").unwrap();
    assert!(task.fail("late").is_err());
    assert!(task.transition(GenerationStatusKind::Completed).is_err());
    assert_eq!(task.error, None);
}

#[test]
fn test_snapshot_keeps_last_preview_while_uploading() {
    let mut task = GenerationTask::new("call_1", &create_request());
    task.preview("https://cdn/2.jpg").unwrap();
    task.transition(GenerationStatusKind::Uploading).unwrap();

    let snapshot = task.snapshot();
    assert_eq!(snapshot.status, GenerationStatusKind::Uploading);
    assert_eq!(snapshot.streaming_image.as_deref(), Some("https://cdn/2.jpg"));
    assert_eq!(snapshot.prompt, "a red fox in snow");
}

#[test]
fn test_request_to_input_carries_lora_and_source() {
    let request = GenerationRequest::edit(
        "Turn the image into the Pixel style",
        "https://cdn/in.png",
        ResolutionMode::Ratio16x9,
        Some("https://huggingface.co/x/pixel.safetensors".into()),
    );
    let input = request.to_input(&InferenceConfig::default());

    assert_eq!(input.image_url.as_deref(), Some("https://cdn/in.png"));
    assert_eq!(input.resolution_mode, Some(ResolutionMode::Ratio16x9));
    assert_eq!(input.image_size, None);
    assert_eq!(input.loras.len(), 1);
    assert_eq!(input.loras[0].scale, 1.0);
}

// ============================================================================
// Error classification
// ============================================================================

#[test]
fn test_auth_failure_detection() {
    let structured = Error::Imaging(atelier_imaging::Error::Unauthorized {
        status: 401,
        message: "nope".into(),
    });
    assert!(is_auth_failure(&structured));

    let textual = Error::Imaging(atelier_imaging::Error::Api {
        status: 502,
        message: "gateway says Invalid API key".into(),
    });
    assert!(is_auth_failure(&textual));

    let generic = Error::Imaging(atelier_imaging::Error::Api {
        status: 500,
        message: "model crashed".into(),
    });
    assert!(!is_auth_failure(&generic));

    let fetch = Error::Imaging(atelier_imaging::Error::Fetch {
        url: "https://cdn/401.png".into(),
        reason: "HTTP status client error (401 Unauthorized)".into(),
    });
    assert!(!is_auth_failure(&fetch));
}

#[test]
fn test_failure_messages() {
    let auth = Error::Imaging(atelier_imaging::Error::Unauthorized {
        status: 401,
        message: String::new(),
    });
    assert_eq!(
        failure_message(GenerationKind::Create, &auth),
        INVALID_API_KEY_MESSAGE
    );
    assert_eq!(
        failure_message(GenerationKind::Create, &Error::NoImage),
        "Error generating image: No image generated"
    );
    assert_eq!(
        failure_message(GenerationKind::Edit, &Error::NoImage),
        "Error editing image: No image generated"
    );
    assert_eq!(
        failure_message(GenerationKind::Edit, &Error::Cancelled),
        GENERATION_CANCELLED_MESSAGE
    );
}

// ============================================================================
// run_generation
// ============================================================================

#[tokio::test]
async fn test_success_emits_full_sequence() {
    let (ctx, client, mut rx) = setup();
    client.push_events(vec![
        Ok(GenerationOutput::with_image("https://fal.media/p1.jpg")),
        Ok(GenerationOutput::default()),
        Ok(GenerationOutput::with_image("https://fal.media/p2.jpg")),
    ]);

    let outcome = run_generation(&ctx, &ImagingSettings::default(), create_request())
        .await
        .unwrap();

    let events = drain(&mut rx);
    use GenerationStatusKind::*;
    assert_eq!(
        status_kinds(&events),
        vec![Starting, Generating, Generating, Uploading, Completed]
    );

    let statuses = statuses(&events);
    assert_eq!(statuses[1].streaming_image.as_deref(), Some("https://fal.media/p1.jpg"));
    assert_eq!(statuses[3].streaming_image.as_deref(), Some("https://fal.media/p2.jpg"));
    assert_eq!(statuses[4].final_image.as_deref(), Some(outcome.image_url.as_str()));
    assert!(statuses.iter().all(|s| s.kind == GenerationKind::Create));

    // Persisted copy of the provider URL
    let stored = client.storage().get(&outcome.image_url).unwrap();
    assert_eq!(stored, b"https://fal.media/p2.jpg");

    let seqs: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            UiEvent::DataImageGeneration { seq, id, .. } if id == "call_1" => Some(*seq),
            _ => None,
        })
        .collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    assert!(top_level_errors(&events).is_empty());

    let requests = client.requests();
    assert_eq!(requests[0].0, DEFAULT_CREATE_ENDPOINT);
    assert_eq!(requests[0].1.image_size, Some(ImageSize::Portrait4x3));
}

#[tokio::test]
async fn test_empty_stream_is_no_image_error() {
    let (ctx, client, mut rx) = setup();
    client.push_events(vec![]);

    let err = run_generation(&ctx, &ImagingSettings::default(), create_request())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No image generated"));

    let events = drain(&mut rx);
    use GenerationStatusKind::*;
    assert_eq!(status_kinds(&events), vec![Starting, Error]);
    let last = statuses(&events).pop().unwrap();
    assert!(last.error.unwrap().contains("No image generated"));
    assert_eq!(top_level_errors(&events).len(), 1);
    assert!(client.storage().is_empty());
}

#[tokio::test]
async fn test_unauthorized_uses_invalid_key_message() {
    let (ctx, client, mut rx) = setup();
    client.push_open_failure(atelier_imaging::Error::Unauthorized {
        status: 401,
        message: "Unauthorized".into(),
    });

    let err = run_generation(&ctx, &ImagingSettings::default(), create_request())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), INVALID_API_KEY_MESSAGE);

    let events = drain(&mut rx);
    assert_eq!(top_level_errors(&events), vec![INVALID_API_KEY_MESSAGE.to_string()]);
}

#[tokio::test]
async fn test_generic_provider_failure_is_distinct_from_auth() {
    let (ctx, client, _rx) = setup();
    client.push_open_failure(atelier_imaging::Error::Api {
        status: 500,
        message: "model crashed".into(),
    });

    let err = run_generation(&ctx, &ImagingSettings::default(), create_request())
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("Error generating image:"));
    assert!(!message.contains("Invalid API key"));
}

#[tokio::test]
async fn test_persist_timeout_fails_after_uploading() {
    let (ctx, client, mut rx) = setup();
    client.push_events(vec![Ok(GenerationOutput::with_image("https://fal.media/r.jpg"))]);
    client.push_persist_failure(atelier_imaging::Error::FetchTimeout {
        url: "https://fal.media/r.jpg".into(),
        secs: 30,
    });

    let err = run_generation(&ctx, &ImagingSettings::default(), create_request())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out after 30s"));

    let events = drain(&mut rx);
    use GenerationStatusKind::*;
    assert_eq!(
        status_kinds(&events),
        vec![Starting, Generating, Uploading, Error]
    );
}

#[tokio::test]
async fn test_cancellation_stops_consuming_stream() {
    let (ctx, client, mut rx) = setup();
    client.push_pending();
    let cancel = ctx.cancel.clone();

    let settings = ImagingSettings::default();
    let (result, ()) = tokio::join!(run_generation(&ctx, &settings, create_request()), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), GENERATION_CANCELLED_MESSAGE);

    let events = drain(&mut rx);
    use GenerationStatusKind::*;
    assert_eq!(status_kinds(&events), vec![Starting, Error]);
}

#[tokio::test]
async fn test_closed_stream_cancels_and_fails_quietly() {
    let (ctx, client, rx) = setup();
    client.push_events(vec![Ok(GenerationOutput::with_image("https://fal.media/r.jpg"))]);
    drop(rx);

    let err = run_generation(&ctx, &ImagingSettings::default(), create_request())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), GENERATION_CANCELLED_MESSAGE);
    assert!(ctx.cancel.is_cancelled());
    assert!(client.requests().is_empty());
}

/// Yields one result, then cancels `cancel` as the stream ends
struct CancelOnEndClient {
    cancel: CancellationToken,
    storage: ScriptedImagingClient,
}

#[async_trait]
impl ImagingClient for CancelOnEndClient {
    async fn stream(
        &self,
        _endpoint: &str,
        _input: &GenerationInput,
    ) -> atelier_imaging::Result<GenerationStream> {
        let cancel = self.cancel.clone();
        let tail = futures::stream::once(async move { cancel.cancel() })
            .filter_map(|()| async { None::<atelier_imaging::Result<GenerationOutput>> });
        let events = futures::stream::iter(vec![Ok(GenerationOutput::with_image(
            "https://fal.media/r.jpg",
        ))])
        .chain(tail);
        Ok(GenerationStream::new(events.boxed()))
    }

    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> atelier_imaging::Result<String> {
        self.storage.upload(bytes, content_type).await
    }

    async fn persist(&self, url: &str) -> atelier_imaging::Result<String> {
        self.storage.persist(url).await
    }
}

#[tokio::test]
async fn test_cancel_while_stream_finishes_skips_upload() {
    let cancel = CancellationToken::new();
    let storage = ScriptedImagingClient::new();
    let (emitter, mut rx) = StatusEmitter::channel(64, cancel.clone());
    let client = CancelOnEndClient {
        cancel: cancel.clone(),
        storage: storage.clone(),
    };
    let ctx = ToolContext::new("call_1", emitter, Arc::new(client));

    let err = run_generation(&ctx, &ImagingSettings::default(), create_request())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), GENERATION_CANCELLED_MESSAGE);

    let events = drain(&mut rx);
    use GenerationStatusKind::*;
    assert_eq!(status_kinds(&events), vec![Starting, Generating, Error]);
    assert!(storage.storage().is_empty());
}

#[tokio::test]
async fn test_data_wrapped_final_result_completes() {
    let (ctx, client, mut rx) = setup();
    let wrapped: GenerationOutput = serde_json::from_str(
        r#"{"data":{"images":[{"url":"https://v3.fal.media/x.jpg"}]},"requestId":"r1"}"#,
    )
    .unwrap();
    client.push_events(vec![Ok(wrapped)]);

    let outcome = run_generation(&ctx, &ImagingSettings::default(), create_request())
        .await
        .unwrap();

    let stored = client.storage().get(&outcome.image_url).unwrap();
    assert_eq!(stored, b"https://v3.fal.media/x.jpg");

    let events = drain(&mut rx);
    use GenerationStatusKind::*;
    assert_eq!(
        status_kinds(&events),
        vec![Starting, Generating, Uploading, Completed]
    );
}
