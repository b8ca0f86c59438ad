//! Integration tests for Atelier
//!
//! These tests drive the full axum router:
//! - Credential gate: quota, caller keys, 429 before any model call
//! - Bot guard and request validation
//! - Chat stream framing and the createImage round trip
//! - Upload, styles and health endpoints

use atelier::server::{build_app, AppConfig};
use atelier_imaging::{ClientFactory, GenerationOutput, ImagingClient, ScriptedImagingClient};
use atelier_llm::{LlmProvider, MockProvider, ToolCall};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/126.0";

// ============================================================================
// Helpers
// ============================================================================

/// Factory that hands out one scripted client and records every key
struct CountingFactory {
    client: ScriptedImagingClient,
    built: AtomicUsize,
    keys: Mutex<Vec<String>>,
}

impl CountingFactory {
    fn new(client: ScriptedImagingClient) -> Self {
        Self {
            client,
            built: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
        }
    }

    fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

impl ClientFactory for CountingFactory {
    fn for_key(&self, key: &str) -> Arc<dyn ImagingClient> {
        self.built.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(key.to_string());
        Arc::new(self.client.clone())
    }
}

struct TestApp {
    router: Router,
    provider: Arc<MockProvider>,
    factory: Arc<CountingFactory>,
    imaging: ScriptedImagingClient,
}

fn test_config(max_requests: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.rate_limit.max_requests = max_requests;
    config.rate_limit.window_secs = 3600;
    config.bot_protection.blocked_user_agents = vec!["(?i)bot".to_string()];
    config
}

fn test_app(config: AppConfig) -> TestApp {
    let provider = Arc::new(MockProvider::new());
    let imaging = ScriptedImagingClient::new();
    let factory = Arc::new(CountingFactory::new(imaging.clone()));

    let router = build_app(
        &config,
        provider.clone() as Arc<dyn LlmProvider>,
        factory.clone() as Arc<dyn ClientFactory>,
        "shared-project-key",
    )
    .unwrap();

    TestApp {
        router,
        provider,
        factory,
        imaging,
    }
}

fn chat_body(api_key: Option<&str>) -> Value {
    let mut body = json!({
        "messages": [{
            "id": "u1",
            "role": "user",
            "parts": [{"type": "text", "text": "draw a cat"}]
        }]
    });
    if let Some(key) = api_key {
        body["apiKey"] = json!(key);
    }
    body
}

fn chat_request(body: &Value, ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, BROWSER_UA)
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// JSON payloads of every `data:` frame except the final marker
fn frames(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

fn kinds(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .map(|f| f["type"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Chat stream
// ============================================================================

#[tokio::test]
async fn test_chat_streams_ui_message_protocol() {
    let app = test_app(test_config(5));
    app.provider.push_text("Hello there!");

    let response = app
        .router
        .clone()
        .oneshot(chat_request(&chat_body(None), "203.0.113.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-vercel-ai-ui-message-stream"], "v1");
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = body_text(response).await;
    assert!(body.trim_end().ends_with("data: [DONE]"));

    let frames = frames(&body);
    assert_eq!(
        kinds(&frames),
        vec![
            "start",
            "start-step",
            "text-start",
            "text-delta",
            "text-end",
            "finish-step",
            "finish"
        ]
    );
    assert_eq!(frames[3]["delta"], "Hello there!");
}

#[tokio::test]
async fn test_create_image_round_trip() {
    let app = test_app(test_config(5));
    app.provider.push_tool_calls(vec![ToolCall::new(
        "call_1",
        "createImage",
        r#"{"prompt": "a cat, Pixel style", "imageSize": "square_hd"}"#,
    )]);
    app.provider.push_text("Here is your cat.");
    app.imaging.push_events(vec![
        Ok(GenerationOutput::with_image("https://fal.media/preview-1.jpg")),
        Ok(GenerationOutput::with_image("https://fal.media/final.jpg")),
    ]);

    let response = app
        .router
        .clone()
        .oneshot(chat_request(&chat_body(None), "203.0.113.2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let frames = frames(&body_text(response).await);
    let statuses: Vec<&str> = frames
        .iter()
        .filter(|f| f["type"] == "data-image-generation")
        .map(|f| f["data"]["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses.first(), Some(&"starting"));
    assert_eq!(statuses.last(), Some(&"completed"));
    assert!(statuses.contains(&"uploading"));

    let output = frames
        .iter()
        .find(|f| f["type"] == "tool-output-available")
        .unwrap();
    assert_eq!(output["toolCallId"], "call_1");
    assert!(output["output"]["imageUrl"]
        .as_str()
        .unwrap()
        .starts_with("memory://"));
    assert_eq!(kinds(&frames).last().map(String::as_str), Some("finish"));

    let requests = app.imaging.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "fal-ai/flux-kontext-lora/text-to-image");
    assert_eq!(app.provider.requests().len(), 2);
}

// ============================================================================
// Credential gate
// ============================================================================

#[tokio::test]
async fn test_request_over_quota_is_rejected_before_model_call() {
    let app = test_app(test_config(2));
    for _ in 0..2 {
        app.provider.push_text("ok");
        let response = app
            .router
            .clone()
            .oneshot(chat_request(&chat_body(None), "198.51.100.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await;
    }
    assert_eq!(app.provider.requests().len(), 2);

    let response = app
        .router
        .clone()
        .oneshot(chat_request(&chat_body(None), "198.51.100.7"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(
        body["message"],
        "Rate limit exceeded. Add your own FAL API key in settings to continue generating images."
    );

    assert_eq!(app.provider.requests().len(), 2);
    assert_eq!(app.factory.built(), 2);
}

#[tokio::test]
async fn test_quota_is_per_identity() {
    let app = test_app(test_config(1));

    let first = app
        .router
        .clone()
        .oneshot(chat_request(&chat_body(None), "192.0.2.1"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    body_text(first).await;

    let other = app
        .router
        .clone()
        .oneshot(chat_request(&chat_body(None), "192.0.2.2"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_caller_key_bypasses_exhausted_quota() {
    let app = test_app(test_config(0));

    let response = app
        .router
        .clone()
        .oneshot(chat_request(&chat_body(None), "192.0.2.9"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app
        .router
        .clone()
        .oneshot(chat_request(&chat_body(Some("fal-caller-key")), "192.0.2.9"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_text(response).await;

    assert_eq!(app.factory.keys(), vec!["fal-caller-key".to_string()]);
}

#[tokio::test]
async fn test_disabled_rate_limit_uses_shared_key() {
    let mut config = test_config(0);
    config.rate_limit.enabled = false;
    let app = test_app(config);

    let response = app
        .router
        .clone()
        .oneshot(chat_request(&chat_body(None), "192.0.2.10"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_text(response).await;
    assert_eq!(app.factory.keys(), vec!["shared-project-key".to_string()]);
}

// ============================================================================
// Request validation
// ============================================================================

#[tokio::test]
async fn test_bot_user_agent_is_forbidden() {
    let app = test_app(test_config(5));

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "Googlebot/2.1")
        .body(Body::from(chat_body(None).to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(chat_body(None).to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert_eq!(app.provider.requests().len(), 0);
    assert_eq!(app.factory.built(), 0);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = test_app(test_config(5));

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, BROWSER_UA)
        .body(Body::from("{\"messages\": not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"], "Invalid request");
    assert_eq!(app.factory.built(), 0);
}

// ============================================================================
// Other endpoints
// ============================================================================

#[tokio::test]
async fn test_upload_data_url() {
    let app = test_app(test_config(5));

    let request = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, BROWSER_UA)
        .body(Body::from(
            json!({"image": "data:image/png;base64,aGVsbG8="}).to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    let url = body["url"].as_str().unwrap();
    assert_eq!(app.imaging.storage().get(url), Some(b"hello".to_vec()));
}

#[tokio::test]
async fn test_upload_failure_is_internal_error() {
    let app = test_app(test_config(5));
    app.imaging
        .push_upload_failure(atelier_imaging::Error::Storage("connection reset".into()));

    let request = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, BROWSER_UA)
        .body(Body::from(
            json!({"image": "data:image/png;base64,aGVsbG8="}).to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"], "Failed to upload image");
}

#[tokio::test]
async fn test_upload_refuses_remote_urls() {
    let app = test_app(test_config(5));

    for image in [
        "http://169.254.169.254/latest/meta-data/",
        "http://127.0.0.1:6379/",
        "https://example.com/cat.png",
        "data:text/plain,hello",
    ] {
        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, BROWSER_UA)
            .body(Body::from(json!({ "image": image }).to_string()))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{image}");
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"], "Invalid request");
    }
    assert!(app.imaging.storage().is_empty());
}

#[tokio::test]
async fn test_styles_and_health() {
    let app = test_app(test_config(5));

    let request = Request::builder()
        .uri("/api/styles")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let styles: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(styles.as_array().unwrap().len(), 9);
    assert!(styles[0]["loraUrl"].is_string());

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["test_mode"], false);
}
