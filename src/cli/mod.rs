//! CLI module for Atelier
//!
//! Provides commands:
//! - `serve`: Run the HTTP server (default)
//! - `check`: Load and validate configuration without serving
//! - `styles`: Print the built-in style catalog

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod check;

/// Atelier image generation assistant
#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(about = "Chat image generation assistant server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (default)
    Serve,
    /// Validate configuration and environment
    Check,
    /// List the built-in styles
    Styles {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        None | Some(Commands::Serve) => crate::server::run().await,
        Some(Commands::Check) => check::run(),
        Some(Commands::Styles { json }) => print_styles(json),
    }
}

fn print_styles(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(atelier_core::STYLES)?);
        return Ok(());
    }

    for style in atelier_core::STYLES {
        let trigger = if style.trigger_word.is_empty() {
            "-"
        } else {
            style.trigger_word
        };
        println!("{:<18} {:<18} {}", style.id, style.name, trigger);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["atelier"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["atelier", "styles", "--json"]);
        assert!(matches!(cli.command, Some(Commands::Styles { json: true })));

        let cli = Cli::parse_from(["atelier", "check"]);
        assert!(matches!(cli.command, Some(Commands::Check)));
    }
}
