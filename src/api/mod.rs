//! Web API module for Atelier
//!
//! Provides REST API endpoints for:
//! - Chat turns streamed as a UI message stream (`/api/chat`)
//! - Image uploads into durable storage (`/api/upload`)
//! - The style catalog (`/api/styles`)
//! - Health checks (`/health`)

pub mod chat;
pub mod error;
pub mod health;
pub mod styles;
pub mod upload;

use crate::middleware::{BotGuard, BotGuardLayer};
use atelier_core::{ChatOrchestrator, CredentialGate};
use axum::Router;
use std::sync::Arc;

pub use chat::chat_routes;
pub use error::ApiError;
pub use health::health_routes;
pub use styles::styles_routes;
pub use upload::upload_routes;

/// Shared state of the API handlers
#[derive(Clone)]
pub struct AppState {
    /// Picks the image provider credential per request
    pub gate: Arc<CredentialGate>,
    /// Model loop
    pub orchestrator: ChatOrchestrator,
    /// Image provider is simulated
    pub test_mode: bool,
}

/// Create the API router with all endpoints
///
/// The bot guard only covers the routes that spend provider credit.
pub fn api_router(state: AppState, bot_guard: Arc<BotGuard>) -> Router {
    let guarded = Router::new()
        .merge(chat_routes())
        .merge(upload_routes())
        .layer(BotGuardLayer::new(bot_guard));

    Router::new()
        .merge(guarded)
        .merge(styles_routes())
        .merge(health_routes())
        .with_state(state)
}
