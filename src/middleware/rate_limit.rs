//! Rate limiting for shared-key requests
//!
//! Builds the fixed-window limiter used by the credential gate and
//! resolves the caller identity it counts against.

use anyhow::{Context, Result};
use atelier_core::{
    FixedWindowLimiter, MemoryRateLimitStore, RateLimitConfig, RateLimitStore, RedisRateLimitStore,
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Identity used when nothing identifies the caller
pub const ANONYMOUS: &str = "anonymous";

// ============================================================================
// Config
// ============================================================================

/// Where window counters live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// Process-local map
    #[default]
    Memory,
    /// Redis, shared across instances
    Redis,
}

/// Rate limit configuration (deserializable from TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Enable rate limiting of the shared key
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Shared-key generations allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default)]
    pub backend: RateLimitBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_true() -> bool {
    true
}
fn default_max_requests() -> u32 {
    5
}
fn default_window_secs() -> u64 {
    24 * 3600
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_key_prefix() -> String {
    "atelier:ratelimit".to_string()
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            backend: RateLimitBackend::default(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RateLimitSettings {
    /// Limiter configuration
    pub fn limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.max_requests, Duration::from_secs(self.window_secs))
            .with_key_prefix(&self.key_prefix)
    }

    /// Build the limiter, or `None` when rate limiting is disabled
    ///
    /// The memory backend also gets a periodic cleanup task, so this must be
    /// called inside a Tokio runtime.
    pub fn build_limiter(&self) -> Result<Option<FixedWindowLimiter>> {
        if !self.enabled {
            info!("Shared key rate limiting disabled");
            return Ok(None);
        }

        let store: Arc<dyn RateLimitStore> = match self.backend {
            RateLimitBackend::Memory => {
                let store = Arc::new(MemoryRateLimitStore::new());
                spawn_cleanup(store.clone());
                store
            }
            RateLimitBackend::Redis => Arc::new(
                RedisRateLimitStore::new(&self.redis_url)
                    .context("Failed to create Redis rate limit store")?,
            ),
        };

        info!(
            backend = ?self.backend,
            max_requests = self.max_requests,
            window_secs = self.window_secs,
            "Shared key rate limiting enabled"
        );
        Ok(Some(FixedWindowLimiter::new(self.limiter_config(), store)))
    }
}

/// Drop expired memory windows every five minutes
fn spawn_cleanup(store: Arc<MemoryRateLimitStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let removed = store.cleanup();
            if removed > 0 {
                debug!(removed, "Expired rate limit windows dropped");
            }
        }
    });
}

// ============================================================================
// Caller identity
// ============================================================================

/// Identity the shared-key quota is counted against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(caller_identity(&parts.headers, peer)))
    }
}

/// Resolve the caller identity.
/// First `x-forwarded-for` entry, then `x-real-ip`, then the socket peer.
pub fn caller_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(ip) = header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return ip.to_string();
    }

    if let Some(ip) = header_str(headers, "x-real-ip")
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.9:51234".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_first_entry_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));

        assert_eq!(caller_identity(&headers, peer()), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_then_peer_then_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(" 198.51.100.2 "));
        assert_eq!(caller_identity(&headers, peer()), "198.51.100.2");

        let headers = HeaderMap::new();
        assert_eq!(caller_identity(&headers, peer()), "10.0.0.9");
        assert_eq!(caller_identity(&headers, None), ANONYMOUS);
    }

    #[test]
    fn test_blank_forwarded_for_is_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        assert_eq!(caller_identity(&headers, None), ANONYMOUS);
    }

    #[test]
    fn test_limiter_config_from_settings() {
        let settings = RateLimitSettings {
            max_requests: 10,
            window_secs: 60,
            key_prefix: "test".to_string(),
            ..Default::default()
        };
        let config = settings.limiter_config();
        assert_eq!(config.max_requests, 10);
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(config.key_prefix, "test");
    }

    #[tokio::test]
    async fn test_disabled_settings_build_no_limiter() {
        let settings = RateLimitSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(settings.build_limiter().unwrap().is_none());
        assert!(RateLimitSettings::default().build_limiter().unwrap().is_some());
    }
}
