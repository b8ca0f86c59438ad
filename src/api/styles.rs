//! Style catalog endpoint

use super::AppState;
use atelier_core::{StyleModel, STYLES};
use axum::{response::Json, routing::get, Router};

/// Create style routes
pub fn styles_routes() -> Router<AppState> {
    Router::new().route("/api/styles", get(list_styles))
}

async fn list_styles() -> Json<&'static [StyleModel]> {
    Json(STYLES)
}
