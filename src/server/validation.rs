//! Startup configuration validation
//!
//! Hard failures for settings the server cannot run with, plus security
//! warnings for production deployments.

use super::config::AppConfig;
use anyhow::{bail, Context, Result};
use regex::Regex;
use tracing::warn;

/// Validate configuration before anything is started
///
/// `fal_key` is the shared project key from the environment.
pub fn validate_config(config: &AppConfig, fal_key: Option<&str>) -> Result<()> {
    let has_key = fal_key.map(str::trim).is_some_and(|k| !k.is_empty());
    if !has_key && !config.test_mode.enabled {
        bail!("FAL_KEY is not set. Set it in the environment or enable [test_mode].");
    }

    if config.rate_limit.enabled {
        if config.rate_limit.window_secs == 0 {
            bail!("rate_limit.window_secs must be greater than zero");
        }
        if config.rate_limit.max_requests == 0 {
            warn!("rate_limit.max_requests is 0: every shared-key request will be rejected");
        }
    }

    for pattern in &config.bot_protection.blocked_user_agents {
        Regex::new(pattern)
            .with_context(|| format!("Invalid bot_protection.blocked_user_agents entry: {}", pattern))?;
    }

    if config.llm.max_steps == 0 {
        bail!("llm.max_steps must be at least 1");
    }

    validate_production_config(config);
    Ok(())
}

/// Security warnings for production deployments
fn validate_production_config(config: &AppConfig) {
    let is_production = std::env::var("ATELIER_ENV")
        .map(|v| v.to_lowercase() == "production")
        .unwrap_or(false);

    if !is_production {
        return;
    }

    if config.test_mode.enabled {
        warn!("SECURITY WARNING: test_mode is enabled in production; no real images will be generated.");
    }

    if !config.rate_limit.enabled {
        warn!(
            "SECURITY WARNING: Shared key rate limiting is DISABLED in production. \
             Anyone can spend the project's image credit."
        );
    }

    if !config.bot_protection.enabled {
        warn!("SECURITY WARNING: Bot protection is DISABLED in production.");
    }

    if config.rate_limit.backend == crate::middleware::RateLimitBackend::Redis
        && config.rate_limit.redis_url.starts_with("redis://")
        && !config.rate_limit.redis_url.contains('@')
    {
        warn!(
            "SECURITY WARNING: Redis connection appears to have no authentication in production. \
             Consider enabling Redis AUTH."
        );
    }
}
