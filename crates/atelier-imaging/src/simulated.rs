//! Offline test mode
//!
//! Stands in for the provider when no network calls should be made: every
//! generation waits, shows one preview, waits again and finishes with the
//! same mock image. Persistence returns the URL unchanged.

use crate::client::{ClientFactory, GenerationStream, ImagingClient};
use crate::error::Result;
use crate::types::{GenerationInput, GenerationOutput};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default mock image served in test mode
pub const DEFAULT_MOCK_IMAGE_URL: &str =
    "https://v3.fal.media/files/elephant/00rs5Nhmp2JZ0WSnGNdUM_1752483234655.jpeg";

/// Default delay before each simulated event
pub const DEFAULT_DELAY_MS: u64 = 5000;

/// Provider stand-in for test mode
#[derive(Debug, Clone)]
pub struct SimulatedImagingClient {
    delay: Duration,
    mock_url: String,
}

impl Default for SimulatedImagingClient {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DELAY_MS), DEFAULT_MOCK_IMAGE_URL)
    }
}

impl SimulatedImagingClient {
    /// Client with the given delay and mock image
    #[must_use]
    pub fn new(delay: Duration, mock_url: impl Into<String>) -> Self {
        Self {
            delay,
            mock_url: mock_url.into(),
        }
    }
}

#[async_trait]
impl ImagingClient for SimulatedImagingClient {
    async fn stream(&self, endpoint: &str, input: &GenerationInput) -> Result<GenerationStream> {
        debug!(endpoint = %endpoint, prompt = %input.prompt, "Simulating generation");

        let delay = self.delay;
        let output = GenerationOutput::with_image(self.mock_url.clone());

        // Two events: the preview, then the final result.
        let events = futures::stream::unfold(0u8, move |step| {
            let output = output.clone();
            async move {
                if step >= 2 {
                    return None;
                }
                tokio::time::sleep(delay).await;
                Some((Ok(output), step + 1))
            }
        });

        Ok(GenerationStream::new(events.boxed()))
    }

    async fn upload(&self, _bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        Ok(self.mock_url.clone())
    }

    async fn persist(&self, url: &str) -> Result<String> {
        Ok(url.to_string())
    }
}

/// Hands out the same simulated client for every key
#[derive(Debug, Clone, Default)]
pub struct SimulatedClientFactory {
    client: Arc<SimulatedImagingClient>,
}

impl SimulatedClientFactory {
    /// Factory wrapping `client`
    #[must_use]
    pub fn new(client: SimulatedImagingClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl ClientFactory for SimulatedClientFactory {
    fn for_key(&self, _key: &str) -> Arc<dyn ImagingClient> {
        self.client.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageSize, InferenceConfig};

    #[tokio::test(start_paused = true)]
    async fn test_one_preview_then_final() {
        let client = SimulatedImagingClient::new(Duration::from_millis(5000), "https://mock/x.jpg");
        let input = GenerationInput::create("cat", ImageSize::Square, InferenceConfig::default());

        let mut stream = client.stream("fal-ai/any", &input).await.unwrap();
        let preview = stream.next_event().await.unwrap().unwrap();
        assert_eq!(preview.first_url(), Some("https://mock/x.jpg"));

        let done = stream.done().await.unwrap();
        assert_eq!(done.first_url(), Some("https://mock/x.jpg"));
    }

    #[tokio::test]
    async fn test_persist_passes_url_through() {
        let client = SimulatedImagingClient::default();
        assert_eq!(
            client.persist("https://v3.fal.media/a.jpg").await.unwrap(),
            "https://v3.fal.media/a.jpg"
        );
    }
}
