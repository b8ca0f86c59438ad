//! Rate limiting for the shared project key
//!
//! Fixed-window limiter over an injected counting store. The store owns the
//! only shared mutable state and exposes one atomic operation, so the
//! limiter itself holds no locks across awaits.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Length of one window
    pub window: Duration,
    /// Prefix for store keys
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(24 * 3600),
            key_prefix: "atelier:ratelimit".to_string(),
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit config
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            ..Self::default()
        }
    }

    /// Set the store key prefix
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Create config for requests per minute
    #[must_use]
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Create config for requests per day
    #[must_use]
    pub fn per_day(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(24 * 3600))
    }

    fn window_ms(&self) -> u64 {
        (self.window.as_millis() as u64).max(1)
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Time until the window rolls over
    pub reset_after: Duration,
    /// Request count in the current window, including this one
    pub current: u32,
}

impl RateLimitResult {
    /// Seconds to put in `Retry-After`, at least one
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_after.as_secs_f64().ceil().max(1.0) as u64
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Wall clock in milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    /// Current time
    fn now_ms(&self) -> u64;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Manually advanced clock for tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: std::sync::atomic::AtomicU64,
}

impl ManualClock {
    /// Clock frozen at `now_ms`
    #[must_use]
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: std::sync::atomic::AtomicU64::new(now_ms),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(
            by.as_millis() as u64,
            std::sync::atomic::Ordering::SeqCst,
        );
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}

// ============================================================================
// Stores
// ============================================================================

/// Counting store behind the limiter
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically increment `key` and return the new count
    ///
    /// The key expires after `window`; a fresh key starts at zero.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64>;
}

/// In-memory store, process-wide
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    counters: Mutex<HashMap<String, (u64, tokio::time::Instant)>>,
}

impl MemoryRateLimitStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = tokio::time::Instant::now();
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let before = counters.len();
        counters.retain(|_, (_, expires_at)| *expires_at > now);
        before - counters.len()
    }

    /// Number of live keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Check if no keys are tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64> {
        let now = tokio::time::Instant::now();
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let entry = counters
            .entry(key.to_string())
            .or_insert((0, now + window));
        if entry.1 <= now {
            *entry = (0, now + window);
        }
        entry.0 += 1;
        Ok(entry.0)
    }
}

/// Redis-backed store, shared across server instances
///
/// `MULTI INCR PEXPIRE EXEC` keeps the increment and the expiry atomic on
/// the server.
pub struct RedisRateLimitStore {
    client: redis::Client,
}

impl RedisRateLimitStore {
    /// Create a new Redis store
    ///
    /// # Errors
    ///
    /// Returns error if Redis URL is invalid
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| Error::Store(e.to_string()))?;
        Ok(Self { client })
    }

    /// Get an async connection
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Store(format!("Redis connection failed: {}", e)))
    }
}

impl std::fmt::Debug for RedisRateLimitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateLimitStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64> {
        let mut conn = self.get_connection().await?;

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(window.as_millis() as u64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("Redis INCR failed: {}", e)))?;

        debug!(key = %key, count, "Rate limit counter incremented");
        Ok(count)
    }
}

// ============================================================================
// Limiter
// ============================================================================

/// Fixed-window limiter keyed by caller identity
#[derive(Clone)]
pub struct FixedWindowLimiter {
    config: RateLimitConfig,
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl FixedWindowLimiter {
    /// Create a limiter over `store` using the system clock
    #[must_use]
    pub fn new(config: RateLimitConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Create a limiter with an explicit clock
    #[must_use]
    pub fn with_clock(
        config: RateLimitConfig,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    /// Limiter configuration
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Store key for `identity` at `now_ms`
    #[must_use]
    pub fn window_key(&self, identity: &str, now_ms: u64) -> String {
        format!(
            "{}:{}:{}",
            self.config.key_prefix,
            identity,
            now_ms / self.config.window_ms()
        )
    }

    /// Count one request for `identity` and decide whether it may proceed
    ///
    /// # Errors
    ///
    /// Returns the store error unchanged; callers decide how an outage surfaces.
    pub async fn acquire(&self, identity: &str) -> Result<RateLimitResult> {
        let now_ms = self.clock.now_ms();
        let window_ms = self.config.window_ms();
        let key = self.window_key(identity, now_ms);

        let count = self.store.increment(&key, self.config.window).await?;
        let current = u32::try_from(count).unwrap_or(u32::MAX);
        let max = self.config.max_requests;
        let reset_after = Duration::from_millis(window_ms - now_ms % window_ms);

        if current <= max {
            Ok(RateLimitResult {
                allowed: true,
                remaining: max - current,
                reset_after,
                current,
            })
        } else {
            warn!(identity = %identity, current, max, "Rate limit exceeded");
            Ok(RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_after,
                current,
            })
        }
    }
}

impl std::fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
