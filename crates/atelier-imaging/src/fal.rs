//! fal.ai client
//!
//! Generation uses the synchronous streaming route (`POST {base}/{endpoint}/stream`),
//! which answers with SSE events carrying partial results; the last event is
//! the final result. Storage uses the two-step CDN upload: initiate, then PUT.

use crate::client::{ClientFactory, GenerationStream, ImagingClient};
use crate::error::{Error, Result};
use crate::fetch::{ImageFetcher, DEFAULT_FETCH_TIMEOUT_SECS};
use crate::sse::SseDecoder;
use crate::types::{GenerationInput, GenerationOutput};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default generation host
pub const DEFAULT_BASE_URL: &str = "https://fal.run";

/// Default storage REST host
pub const DEFAULT_STORAGE_URL: &str = "https://rest.alpha.fal.ai";

/// Upper bound on provider error bodies kept in messages
const MAX_ERROR_BODY: usize = 300;

/// Configuration for the fal.ai client
#[derive(Clone)]
pub struct FalConfig {
    /// API key (`Authorization: Key <key>`)
    pub api_key: String,
    /// Generation host
    pub base_url: String,
    /// Storage REST host
    pub storage_url: String,
    /// Timeout for a whole generation request
    pub request_timeout: Duration,
    /// Timeout for downloading a result image
    pub fetch_timeout: Duration,
}

impl fmt::Debug for FalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FalConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("storage_url", &self.storage_url)
            .field("request_timeout", &self.request_timeout)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl Default for FalConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            request_timeout: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

impl FalConfig {
    /// Configuration with the given key and default hosts
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Sets the generation host
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the storage host
    #[must_use]
    pub fn with_storage_url(mut self, url: impl Into<String>) -> Self {
        self.storage_url = url.into();
        self
    }

    /// Sets the generation request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the result fetch timeout
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    fn stream_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/stream",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_matches('/')
        )
    }

    fn initiate_url(&self) -> String {
        format!(
            "{}/storage/upload/initiate?storage_type=fal-cdn-v3",
            self.storage_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Serialize)]
struct InitiateUploadRequest<'a> {
    content_type: &'a str,
    file_name: String,
}

#[derive(Debug, Deserialize)]
struct InitiateUploadResponse {
    upload_url: String,
    file_url: String,
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &body[..end])
}

/// Map a non-success response to an error, keeping auth failures structured
async fn status_error(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let message = truncate_body(&response.text().await.unwrap_or_default());
    match status {
        401 | 403 => Error::Unauthorized { status, message },
        _ => Error::Api { status, message },
    }
}

fn network_error(e: reqwest::Error) -> Error {
    Error::Network(e.to_string())
}

/// fal.ai client bound to one API key
pub struct FalClient {
    config: FalConfig,
    http: reqwest::Client,
    fetcher: ImageFetcher,
}

impl FalClient {
    /// Creates a client with its own connection pool
    #[must_use]
    pub fn new(config: FalConfig) -> Self {
        Self::with_http(config, reqwest::Client::new())
    }

    /// Creates a client sharing an existing connection pool
    #[must_use]
    pub fn with_http(config: FalConfig, http: reqwest::Client) -> Self {
        let fetcher = ImageFetcher::with_client(http.clone(), config.fetch_timeout);
        Self {
            config,
            http,
            fetcher,
        }
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.config.api_key)
    }
}

#[async_trait]
impl ImagingClient for FalClient {
    #[instrument(skip(self, input), fields(endpoint = %endpoint))]
    async fn stream(&self, endpoint: &str, input: &GenerationInput) -> Result<GenerationStream> {
        let url = self.config.stream_url(endpoint);
        debug!(url = %url, "Opening generation stream");

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .timeout(self.config.request_timeout)
            .json(input)
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            let err = status_error(response).await;
            warn!(error = %err, "Generation request rejected");
            return Err(err);
        }

        struct State {
            bytes: futures::stream::BoxStream<'static, reqwest::Result<bytes::Bytes>>,
            decoder: SseDecoder,
            closed: bool,
        }

        let state = State {
            bytes: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            closed: false,
        };

        let events = futures::stream::unfold(state, |mut st| async move {
            loop {
                let event = if st.closed {
                    st.decoder.finish()
                } else {
                    st.decoder.next_event()
                };

                if let Some(event) = event {
                    let data = event.data.trim();
                    if data.is_empty() || data == "[DONE]" {
                        continue;
                    }
                    let parsed = serde_json::from_str::<GenerationOutput>(data)
                        .map_err(|e| Error::InvalidResponse(format!("bad stream event: {e}")));
                    return Some((parsed, st));
                }

                if st.closed {
                    return None;
                }

                match st.bytes.next().await {
                    Some(Ok(chunk)) => st.decoder.push(&chunk),
                    Some(Err(e)) => {
                        st.closed = true;
                        return Some((Err(network_error(e)), st));
                    }
                    None => st.closed = true,
                }
            }
        });

        Ok(GenerationStream::new(events.boxed()))
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len(), content_type = %content_type))]
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let request = InitiateUploadRequest {
            content_type,
            file_name: format!("{}.{}", uuid::Uuid::new_v4(), extension_for(content_type)),
        };

        let response = self
            .http
            .post(self.config.initiate_url())
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(match status_error(response).await {
                Error::Api { status, message } => {
                    Error::Storage(format!("initiate failed (HTTP {status}): {message}"))
                }
                other => other,
            });
        }

        let initiated: InitiateUploadResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(format!("initiate response: {e}")))?;

        let put = self
            .http
            .put(&initiated.upload_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(network_error)?;

        if !put.status().is_success() {
            let status = put.status().as_u16();
            return Err(Error::Storage(format!("upload failed (HTTP {status})")));
        }

        debug!(file_url = %initiated.file_url, "Stored image");
        Ok(initiated.file_url)
    }

    async fn persist(&self, url: &str) -> Result<String> {
        let image = self.fetcher.fetch(url).await?;
        self.upload(image.bytes, &image.content_type).await
    }
}

/// Builds `FalClient`s sharing one connection pool
#[derive(Clone)]
pub struct FalClientFactory {
    config: FalConfig,
    http: reqwest::Client,
}

impl FalClientFactory {
    /// Factory using `config` as the template (its key is replaced per client)
    #[must_use]
    pub fn new(config: FalConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

impl ClientFactory for FalClientFactory {
    fn for_key(&self, key: &str) -> Arc<dyn ImagingClient> {
        let config = FalConfig {
            api_key: key.to_string(),
            ..self.config.clone()
        };
        Arc::new(FalClient::with_http(config, self.http.clone()))
    }
}
