//! Server module for Atelier
//!
//! Contains the main server initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures for all server components
//! - `loader`: Configuration loading from files and environment
//! - `validation`: Startup configuration validation
//! - `init`: Provider wiring, router construction and the run loop

pub mod config;
mod init;
mod loader;
mod validation;

// Re-export public API
pub use config::AppConfig;
pub use init::{build_app, resolve_client_factory, resolve_llm_provider, run, Secrets};
pub use loader::{load_config, DEFAULT_CONFIG};
pub use validation::validate_config;
