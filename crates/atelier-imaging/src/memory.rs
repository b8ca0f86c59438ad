//! In-process doubles
//!
//! `MemoryStorage` keeps uploaded blobs in a map keyed by the URL it hands
//! out. `ScriptedImagingClient` replays queued generation scripts and stores
//! uploads in a `MemoryStorage`.

use crate::client::{GenerationStream, ImagingClient};
use crate::error::{Error, Result};
use crate::types::{GenerationInput, GenerationOutput};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

const MEMORY_URL_PREFIX: &str = "memory://atelier/";

/// Blob store addressed by generated URLs
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
}

impl MemoryStorage {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes, returning their URL
    pub fn put(&self, bytes: Vec<u8>, content_type: &str) -> String {
        let url = format!("{MEMORY_URL_PREFIX}{}", uuid::Uuid::new_v4());
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.clone(), (bytes, content_type.to_string()));
        url
    }

    /// Bytes stored at `url`
    #[must_use]
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .map(|(bytes, _)| bytes.clone())
    }

    /// Number of stored objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing has been stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum StreamScript {
    Events(Vec<Result<GenerationOutput>>),
    Fail(Error),
    Pending,
}

/// Imaging client that replays queued scripts
///
/// Each `stream` call consumes one script. An empty queue yields a stream
/// with no events. `persist` stores the source URL's text in memory unless a
/// failure has been queued.
#[derive(Clone, Default)]
pub struct ScriptedImagingClient {
    streams: Arc<Mutex<VecDeque<StreamScript>>>,
    persist_failures: Arc<Mutex<VecDeque<Error>>>,
    upload_failures: Arc<Mutex<VecDeque<Error>>>,
    requests: Arc<Mutex<Vec<(String, GenerationInput)>>>,
    storage: MemoryStorage,
}

impl ScriptedImagingClient {
    /// Client with nothing queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a stream that yields `events` in order
    pub fn push_events(&self, events: Vec<Result<GenerationOutput>>) {
        self.lock_streams().push_back(StreamScript::Events(events));
    }

    /// Queue a stream whose opening fails with `error`
    pub fn push_open_failure(&self, error: Error) {
        self.lock_streams().push_back(StreamScript::Fail(error));
    }

    /// Queue a stream that never yields
    pub fn push_pending(&self) {
        self.lock_streams().push_back(StreamScript::Pending);
    }

    /// Make the next `persist` fail with `error`
    pub fn push_persist_failure(&self, error: Error) {
        self.persist_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    /// Make the next `upload` fail with `error`
    pub fn push_upload_failure(&self, error: Error) {
        self.upload_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    /// `(endpoint, input)` of every `stream` call so far
    #[must_use]
    pub fn requests(&self) -> Vec<(String, GenerationInput)> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Backing storage
    #[must_use]
    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }

    fn lock_streams(&self) -> std::sync::MutexGuard<'_, VecDeque<StreamScript>> {
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ImagingClient for ScriptedImagingClient {
    async fn stream(&self, endpoint: &str, input: &GenerationInput) -> Result<GenerationStream> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((endpoint.to_string(), input.clone()));

        let script = self.lock_streams().pop_front();
        match script {
            Some(StreamScript::Events(events)) => Ok(GenerationStream::from_events(events)),
            Some(StreamScript::Fail(error)) => Err(error),
            Some(StreamScript::Pending) => {
                Ok(GenerationStream::new(futures::stream::pending::<Result<GenerationOutput>>().boxed()))
            }
            None => Ok(GenerationStream::from_events(Vec::new())),
        }
    }

    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let failure = self
            .upload_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(self.storage.put(bytes, content_type))
    }

    async fn persist(&self, url: &str) -> Result<String> {
        let failure = self
            .persist_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(self.storage.put(url.as_bytes().to_vec(), "text/uri-list"))
    }
}
