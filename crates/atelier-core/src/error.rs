//! Error types for atelier-core
//!
//! This module provides error types and user-friendly error formatting.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Shared key quota exhausted for this caller
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until retry is allowed
        retry_after: Option<u64>,
    },

    /// Rate limit store unavailable or misbehaving
    #[error("rate limit store error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("invalid configuration: {field}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },

    /// LLM provider error
    #[error("llm error: {0}")]
    Llm(#[from] atelier_llm::Error),

    /// Tool execution error
    #[error("tool error: {0}")]
    Tool(#[from] atelier_tools::Error),

    /// Image provider error
    #[error("imaging error: {0}")]
    Imaging(#[from] atelier_imaging::Error),

    /// The client went away before the turn finished
    #[error("request cancelled")]
    Cancelled,

    /// Internal error (serialization, etc.)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown when the shared key quota is exhausted
pub const RATE_LIMIT_MESSAGE: &str =
    "Rate limit exceeded. Add your own FAL API key in settings to continue generating images.";

/// Trait for user-friendly error messages
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::RateLimited { .. } => RATE_LIMIT_MESSAGE.to_string(),
            Error::Store(_) => "Rate limiting is temporarily unavailable.".to_string(),
            Error::InvalidConfig { field, message } => {
                format!("Configuration error in '{}': {}", field, message)
            }
            Error::Llm(e) => format!(
                "Error processing request: {}",
                atelier_llm::util::sanitize_error_for_user(&e.to_string())
            ),
            Error::Tool(e) => e.to_string(),
            Error::Imaging(e) => e.to_string(),
            Error::Cancelled => "Request cancelled.".to_string(),
            Error::Internal(msg) => format!("Internal error: {}", msg),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::RateLimited {
                retry_after: Some(secs),
            } => Some(format!(
                "Set your own FAL API key in settings, or retry in {} seconds.",
                secs
            )),
            Error::RateLimited { retry_after: None } => {
                Some("Set your own FAL API key in settings.".to_string())
            }
            Error::InvalidConfig { field, .. } => Some(format!(
                "Check the '{}' setting in config/default.toml or the ATELIER_ environment.",
                field
            )),
            Error::Store(_) => Some("Check that the rate limit store is reachable.".to_string()),
            _ => None,
        }
    }
}

/// Format an error for display in the chat stream
pub fn format_error_for_chat(error: &Error) -> String {
    let mut output = error.user_message();

    if let Some(suggestion) = error.suggestion() {
        output.push_str("\n\n");
        output.push_str(&suggestion);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_message() {
        let error = Error::RateLimited {
            retry_after: Some(30),
        };

        assert_eq!(error.user_message(), RATE_LIMIT_MESSAGE);
        assert!(error.suggestion().unwrap().contains("30 seconds"));
    }

    #[test]
    fn test_llm_error_is_prefixed() {
        let error = Error::from(atelier_llm::Error::Api("model overloaded".to_string()));
        let msg = error.user_message();
        assert!(msg.starts_with("Error processing request: "));
        assert!(msg.contains("model overloaded"));
    }

    #[test]
    fn test_format_for_chat_appends_suggestion() {
        let error = Error::InvalidConfig {
            field: "rate_limit.window_secs".to_string(),
            message: "must be positive".to_string(),
        };
        let text = format_error_for_chat(&error);
        assert!(text.contains("must be positive"));
        assert!(text.contains("config/default.toml"));
    }

    #[test]
    fn test_tool_error_passes_through() {
        let error = Error::from(atelier_tools::Error::NoImage);
        assert_eq!(error.user_message(), "No image generated");
        assert!(error.suggestion().is_none());
    }
}
