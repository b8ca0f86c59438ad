//! Bot protection middleware for Axum
//!
//! Rejects automated clients by `User-Agent` before they reach the
//! generation routes, so scripted traffic never consumes the shared quota.

use crate::api::error::ApiError;
use anyhow::{Context as _, Result};
use axum::{
    http::{header::USER_AGENT, Request},
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

// ============================================================================
// Config
// ============================================================================

/// Bot protection configuration (deserializable from TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotProtectionSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Reject requests without a `User-Agent`
    #[serde(default = "default_true")]
    pub require_user_agent: bool,
    /// Regexes matched against the `User-Agent`
    #[serde(default)]
    pub blocked_user_agents: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for BotProtectionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            require_user_agent: true,
            blocked_user_agents: Vec::new(),
        }
    }
}

// ============================================================================
// Guard
// ============================================================================

/// Compiled bot rules
#[derive(Debug)]
pub struct BotGuard {
    enabled: bool,
    require_user_agent: bool,
    blocked: Vec<Regex>,
}

impl BotGuard {
    /// Compile the configured patterns
    pub fn new(settings: &BotProtectionSettings) -> Result<Self> {
        let blocked = settings
            .blocked_user_agents
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("Invalid bot_protection pattern: {}", pattern))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            enabled: settings.enabled,
            require_user_agent: settings.require_user_agent,
            blocked,
        })
    }

    /// Guard that lets everything through
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            require_user_agent: false,
            blocked: Vec::new(),
        }
    }

    /// Whether a request with this `User-Agent` looks automated
    pub fn is_bot(&self, user_agent: Option<&str>) -> bool {
        if !self.enabled {
            return false;
        }
        match user_agent.map(str::trim).filter(|ua| !ua.is_empty()) {
            None => self.require_user_agent,
            Some(ua) => self.blocked.iter().any(|re| re.is_match(ua)),
        }
    }
}

// ============================================================================
// Axum Layer
// ============================================================================

/// Bot protection layer for Axum
#[derive(Clone)]
pub struct BotGuardLayer {
    guard: Arc<BotGuard>,
}

impl BotGuardLayer {
    /// Create a new bot guard layer
    pub fn new(guard: Arc<BotGuard>) -> Self {
        Self { guard }
    }
}

impl<S> Layer<S> for BotGuardLayer {
    type Service = BotGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BotGuardService {
            inner,
            guard: self.guard.clone(),
        }
    }
}

// ============================================================================
// Axum Service
// ============================================================================

/// Bot protection service wrapper
#[derive(Clone)]
pub struct BotGuardService<S> {
    inner: S,
    guard: Arc<BotGuard>,
}

type BoxFuture<T, E> =
    std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send>>;

impl<S, B> Service<Request<B>> for BotGuardService<S>
where
    S: Service<Request<B>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<Response, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> BoxFuture<Response, S::Error> {
        let user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok());

        if self.guard.is_bot(user_agent) {
            warn!(
                path = %req.uri().path(),
                user_agent = user_agent.unwrap_or("<none>"),
                "Bot request rejected"
            );
            return Box::pin(async { Ok(ApiError::BotDetected.into_response()) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
