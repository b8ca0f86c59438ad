//! Error types for atelier-tools

use crate::status::GenerationStatusKind;
use thiserror::Error;

/// Tool error type
#[derive(Debug, Error)]
pub enum Error {
    /// Tool not found
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Image generation failed; the message is already user-facing
    #[error("{0}")]
    Generation(String),

    /// Image provider error
    #[error(transparent)]
    Imaging(#[from] atelier_imaging::Error),

    /// LLM error
    #[error(transparent)]
    Llm(#[from] atelier_llm::Error),

    /// The outbound stream is gone
    #[error("status stream closed")]
    Closed,

    /// Work stopped because the request was cancelled
    #[error("cancelled")]
    Cancelled,

    /// Provider finished without producing an image
    #[error("No image generated")]
    NoImage,

    /// Status change that would move a task backwards or out of a terminal state
    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status
        from: GenerationStatusKind,
        /// Requested status
        to: GenerationStatusKind,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
