//! Error types for atelier-imaging

use thiserror::Error;

/// Imaging error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider rejected the credentials (HTTP 401/403)
    #[error("Unauthorized (HTTP {status}): {message}")]
    Unauthorized {
        /// HTTP status returned by the provider
        status: u16,
        /// Provider message body
        message: String,
    },

    /// Provider returned a non-success status
    #[error("provider error (HTTP {status}): {message}")]
    Api {
        /// HTTP status returned by the provider
        status: u16,
        /// Provider message body
        message: String,
    },

    /// Image download exceeded the fetch timeout
    #[error("Failed to fetch image from {url}: timed out after {secs}s")]
    FetchTimeout {
        /// URL being fetched
        url: String,
        /// Timeout that elapsed
        secs: u64,
    },

    /// Image download failed for any other reason
    #[error("Failed to fetch image from {url}: {reason}")]
    Fetch {
        /// URL being fetched
        url: String,
        /// What went wrong
        reason: String,
    },

    /// Network error talking to the provider
    #[error("network error: {0}")]
    Network(String),

    /// Provider response could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Storage upload failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Caller supplied bad input
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether the provider rejected the credentials
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
