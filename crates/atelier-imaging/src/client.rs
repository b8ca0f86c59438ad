//! Imaging client abstraction
//!
//! `ImagingClient` is the seam between the generation state machine and the
//! hosted provider. Clients are bound to one credential; `ClientFactory`
//! builds them per request.

use crate::error::Result;
use crate::types::{GenerationInput, GenerationOutput};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;

/// A running generation: partial results followed by the final one
pub struct GenerationStream {
    events: BoxStream<'static, Result<GenerationOutput>>,
    last: Option<GenerationOutput>,
}

impl std::fmt::Debug for GenerationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStream")
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl GenerationStream {
    /// Wrap a stream of provider events
    #[must_use]
    pub fn new(events: BoxStream<'static, Result<GenerationOutput>>) -> Self {
        Self { events, last: None }
    }

    /// A stream that replays the given events
    #[must_use]
    pub fn from_events(events: Vec<Result<GenerationOutput>>) -> Self {
        Self::new(futures::stream::iter(events).boxed())
    }

    /// Next progress event; successful events are remembered as the latest result
    pub async fn next_event(&mut self) -> Option<Result<GenerationOutput>> {
        let event = self.events.next().await?;
        if let Ok(output) = &event {
            self.last = Some(output.clone());
        }
        Some(event)
    }

    /// Drain the stream and return the final result
    ///
    /// A stream that ends without any event resolves to an empty output.
    pub async fn done(mut self) -> Result<GenerationOutput> {
        while let Some(event) = self.next_event().await {
            event?;
        }
        Ok(self.last.unwrap_or_default())
    }
}

/// Hosted image provider bound to one credential
#[async_trait]
pub trait ImagingClient: Send + Sync {
    /// Open a streaming generation at `endpoint`
    async fn stream(&self, endpoint: &str, input: &GenerationInput) -> Result<GenerationStream>;

    /// Store bytes and return a durable public URL
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Copy an ephemeral (or data) URL into durable storage
    async fn persist(&self, url: &str) -> Result<String>;
}

/// Builds imaging clients bound to a credential
pub trait ClientFactory: Send + Sync {
    /// Client bound to `key`
    fn for_key(&self, key: &str) -> Arc<dyn ImagingClient>;
}
