//! UI message stream protocol
//!
//! Everything the server writes to the chat stream is a [`UiEvent`]. Events
//! serialize with a `"type"` tag in the UI message stream v1 vocabulary.
//! Data events additionally carry a per-id sequence number so consumers can
//! discard stale or duplicated updates.

use crate::error::{Error, Result};
use atelier_imaging::GenerationKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ============================================================================
// Generation status payload
// ============================================================================

/// Lifecycle of one image generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatusKind {
    /// Tool call entered, nothing sent to the provider yet
    Starting,
    /// Provider stream open; previews may arrive
    Generating,
    /// Final image obtained, being persisted
    Uploading,
    /// Final image persisted
    Completed,
    /// Failed
    Error,
}

impl GenerationStatusKind {
    /// Position in the forward-only order
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Generating => 1,
            Self::Uploading => 2,
            Self::Completed => 3,
            Self::Error => 4,
        }
    }

    /// Whether no further transition is allowed
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Generating => "generating",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Body of a `data-image-generation` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatus {
    /// Current status
    pub status: GenerationStatusKind,
    /// Prompt sent to the provider
    pub prompt: String,
    /// Create or edit
    #[serde(rename = "type")]
    pub kind: GenerationKind,
    /// Latest preview (generating / uploading)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_image: Option<String>,
    /// Durable result (completed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_image: Option<String>,
    /// Failure message (error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of a `data-image-description` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescription {
    /// Description accumulated so far
    pub description: String,
}

// ============================================================================
// Events
// ============================================================================

/// One event on the outbound chat stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiEvent {
    /// Assistant message begins
    Start {
        /// Id of the assistant message
        #[serde(rename = "messageId")]
        message_id: String,
    },
    /// A model step begins
    StartStep,
    /// A text block begins
    TextStart {
        /// Text block id
        id: String,
    },
    /// Text appended to a block
    TextDelta {
        /// Text block id
        id: String,
        /// Appended text
        delta: String,
    },
    /// A text block ends
    TextEnd {
        /// Text block id
        id: String,
    },
    /// The model requested a tool call
    ToolInputAvailable {
        /// Tool call id
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Tool name
        #[serde(rename = "toolName")]
        tool_name: String,
        /// Parsed arguments
        input: serde_json::Value,
    },
    /// A tool call returned
    ToolOutputAvailable {
        /// Tool call id
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Tool result
        output: serde_json::Value,
    },
    /// A tool call failed
    ToolOutputError {
        /// Tool call id
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Failure message
        #[serde(rename = "errorText")]
        error_text: String,
    },
    /// Generation progress for one tool call
    DataImageGeneration {
        /// Tool call id
        id: String,
        /// Per-id sequence number, starting at 1
        seq: u64,
        /// Status payload
        data: GenerationStatus,
    },
    /// Accumulated description for one tool call
    DataImageDescription {
        /// Tool call id
        id: String,
        /// Per-id sequence number, starting at 1
        seq: u64,
        /// Description payload
        data: ImageDescription,
    },
    /// Free-text error shown to the user
    Error {
        /// Error message
        #[serde(rename = "errorText")]
        error_text: String,
    },
    /// A model step ends
    FinishStep,
    /// Assistant message ends
    Finish,
}

impl UiEvent {
    /// Returns the wire tag
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::StartStep => "start-step",
            Self::TextStart { .. } => "text-start",
            Self::TextDelta { .. } => "text-delta",
            Self::TextEnd { .. } => "text-end",
            Self::ToolInputAvailable { .. } => "tool-input-available",
            Self::ToolOutputAvailable { .. } => "tool-output-available",
            Self::ToolOutputError { .. } => "tool-output-error",
            Self::DataImageGeneration { .. } => "data-image-generation",
            Self::DataImageDescription { .. } => "data-image-description",
            Self::Error { .. } => "error",
            Self::FinishStep => "finish-step",
            Self::Finish => "finish",
        }
    }
}

// ============================================================================
// Emitter
// ============================================================================

/// Writes events to the outbound stream of one chat request
///
/// Cloning shares the channel, the sequence counters and the cancellation
/// token. Events for one id must be emitted from one task at a time; the
/// channel then preserves their order.
#[derive(Debug, Clone)]
pub struct StatusEmitter {
    tx: mpsc::Sender<UiEvent>,
    seqs: Arc<Mutex<HashMap<String, u64>>>,
    cancel: CancellationToken,
}

impl StatusEmitter {
    /// Emitter writing to `tx`, cancelling `cancel` when the receiver is dropped
    #[must_use]
    pub fn new(tx: mpsc::Sender<UiEvent>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            seqs: Arc::new(Mutex::new(HashMap::new())),
            cancel,
        }
    }

    /// Bounded channel plus emitter
    #[must_use]
    pub fn channel(capacity: usize, cancel: CancellationToken) -> (Self, mpsc::Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx, cancel), rx)
    }

    /// Token cancelled when the client goes away
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send one event
    ///
    /// # Errors
    /// `Error::Closed` once the receiver is gone; the request token is cancelled.
    pub async fn emit(&self, event: UiEvent) -> Result<()> {
        if self.tx.send(event).await.is_err() {
            if !self.cancel.is_cancelled() {
                debug!("Outbound stream closed, cancelling request");
                self.cancel.cancel();
            }
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Emit a `data-image-generation` event for `id`
    pub async fn generation_status(&self, id: &str, data: GenerationStatus) -> Result<()> {
        let seq = self.next_seq(id);
        self.emit(UiEvent::DataImageGeneration {
            id: id.to_string(),
            seq,
            data,
        })
        .await
    }

    /// Emit a `data-image-description` event for `id`
    pub async fn image_description(&self, id: &str, description: impl Into<String>) -> Result<()> {
        let seq = self.next_seq(id);
        self.emit(UiEvent::DataImageDescription {
            id: id.to_string(),
            seq,
            data: ImageDescription {
                description: description.into(),
            },
        })
        .await
    }

    /// Emit a top-level `error` event
    pub async fn error(&self, text: impl Into<String>) -> Result<()> {
        self.emit(UiEvent::Error {
            error_text: text.into(),
        })
        .await
    }

    fn next_seq(&self, id: &str) -> u64 {
        let mut seqs = self.seqs.lock().unwrap_or_else(|e| e.into_inner());
        let seq = seqs.entry(id.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }
}
