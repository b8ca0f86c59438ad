//! Configuration check
//!
//! Loads the layered configuration, validates it against the environment
//! and prints what the server would run with.

use crate::server::{load_config, validate_config, Secrets};
use anyhow::Result;
use atelier_llm::util::mask_api_key;

/// Run the check
pub fn run() -> Result<()> {
    let config = load_config()?;
    let secrets = Secrets::from_env();

    println!("Atelier v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("  listen        {}:{}", config.server.host, config.server.port);
    println!("  model         {} (max {} steps)", config.llm.model, config.llm.max_steps);
    println!("  OPENAI_API_KEY {}", describe_secret(secrets.openai_api_key.as_deref()));
    println!("  FAL_KEY       {}", describe_secret(secrets.fal_key.as_deref()));
    println!("  test mode     {}", on_off(config.test_mode.enabled));
    println!(
        "  rate limit    {} ({} per {}s, {:?} store)",
        on_off(config.rate_limit.enabled),
        config.rate_limit.max_requests,
        config.rate_limit.window_secs,
        config.rate_limit.backend
    );
    println!("  bot guard     {}", on_off(config.bot_protection.enabled));
    println!();

    validate_config(&config, secrets.fal_key.as_deref())?;
    if secrets.openai_api_key.is_none() {
        anyhow::bail!("OPENAI_API_KEY is not set");
    }

    println!("Configuration OK");
    Ok(())
}

fn describe_secret(value: Option<&str>) -> String {
    value.map(mask_api_key).unwrap_or_else(|| "(not set)".to_string())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
