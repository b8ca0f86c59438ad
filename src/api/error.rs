//! HTTP error responses
//!
//! Every failure that happens before the chat stream opens is answered
//! with a JSON body `{error, message, timestamp}`.

use atelier_core::{format_error_for_chat, Error, GateError, RATE_LIMIT_MESSAGE};
use axum::{
    extract::rejection::JsonRejection,
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

/// API error mapped to an HTTP status
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request body (400)
    BadRequest(String),
    /// Automated client rejected (403)
    BotDetected,
    /// Shared-key quota exhausted (429)
    RateLimited { retry_after_secs: u64 },
    /// Upload could not be stored (500)
    UploadFailed(String),
    /// Anything else (500)
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::BotDetected => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UploadFailed(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> (String, String) {
        match self {
            Self::BadRequest(message) => ("Invalid request".to_string(), message.clone()),
            Self::BotDetected => (
                "Access denied".to_string(),
                "Automated requests are not allowed.".to_string(),
            ),
            Self::RateLimited { .. } => (
                "Rate limit exceeded".to_string(),
                RATE_LIMIT_MESSAGE.to_string(),
            ),
            Self::UploadFailed(message) => {
                ("Failed to upload image".to_string(), message.clone())
            }
            Self::Internal(message) => ("Internal server error".to_string(), message.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = ?self, "Request failed");
        }

        let (error, message) = self.body();
        let body = Json(ErrorResponse {
            error,
            message,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });

        match self {
            Self::RateLimited { retry_after_secs } => (
                status,
                [(RETRY_AFTER, retry_after_secs.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::RateLimited { retry_after } => Self::RateLimited {
                retry_after_secs: retry_after.unwrap_or(1),
            },
            other => Self::Internal(format_error_for_chat(&other)),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        Error::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let response = ApiError::from(GateError::RateLimited {
            retry_after_secs: 42,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "42");
        let body = body_json(response).await;
        assert_eq!(body["message"], RATE_LIMIT_MESSAGE);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let response =
            ApiError::from(GateError::Backend(Error::Store("connection refused".into())))
                .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("temporarily unavailable"));
    }

    #[tokio::test]
    async fn test_bot_and_upload_bodies() {
        let response = ApiError::BotDetected.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ApiError::UploadFailed("timed out".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Failed to upload image");
        assert_eq!(body["message"], "timed out");
    }
}
