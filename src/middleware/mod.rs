//! Middleware module for the Atelier HTTP server
//!
//! Provides:
//! - Bot protection layer (`User-Agent` rules, 403)
//! - Shared-key rate limiter construction and caller identity

pub mod bot_guard;
pub mod rate_limit;

pub use bot_guard::{BotGuard, BotGuardLayer, BotProtectionSettings};
pub use rate_limit::{caller_identity, CallerIdentity, RateLimitBackend, RateLimitSettings};
