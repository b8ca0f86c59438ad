//! Utility modules for atelier-core
//!
//! - rate_limiter: fixed-window limiting over a pluggable counting store

mod rate_limiter;

pub use rate_limiter::{
    Clock, FixedWindowLimiter, ManualClock, MemoryRateLimitStore, RateLimitConfig,
    RateLimitResult, RateLimitStore, RedisRateLimitStore, SystemClock,
};

#[cfg(test)]
pub(crate) use rate_limiter::MockRateLimitStore;
