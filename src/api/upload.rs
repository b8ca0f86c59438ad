//! Upload endpoint
//!
//! `POST /api/upload` copies a data URL into durable storage with the shared
//! key and returns the public URL. Remote URLs are refused so the server never
//! fetches caller-chosen addresses. Uploads do not count against the
//! generation quota.

use super::{ApiError, AppState};
use atelier_imaging::fetch::decode_data_url;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Upload request body
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// `data:<mime>;base64,<payload>`
    pub image: String,
}

/// Upload response body
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Create upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/api/upload", post(upload))
}

async fn upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let Json(request) = payload?;
    let image = request.image.trim();
    if image.is_empty() {
        return Err(ApiError::BadRequest("image is required".to_string()));
    }

    if !image.starts_with("data:") {
        return Err(ApiError::BadRequest(
            "image must be a base64 data URL".to_string(),
        ));
    }
    let decoded = decode_data_url(image).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let client = state.gate.shared_client();
    match client.upload(decoded.bytes, &decoded.content_type).await {
        Ok(url) => {
            info!(url = %url, "Image uploaded");
            Ok(Json(UploadResponse { url }))
        }
        Err(e) => {
            warn!(error = %e, "Image upload failed");
            Err(ApiError::UploadFailed(e.to_string()))
        }
    }
}
