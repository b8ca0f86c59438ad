//! Orchestrator - the model loop of one chat turn
//!
//! Streams the model with the tool registry bound, runs requested tools in
//! order and feeds their results back until the model answers without a
//! tool call or the step bound is reached. Everything the UI sees goes
//! through the request's `StatusEmitter`.
//!
//! # Module Structure
//!
//! - `config`: `OrchestratorConfig` and the system prompt
//! - `process`: the step loop
//! - `tool_execution`: running one tool call

mod config;
mod process;
mod tool_execution;


pub use config::{OrchestratorConfig, DEFAULT_MAX_STEPS, DEFAULT_MODEL, SYSTEM_PROMPT};

use atelier_llm::LlmProvider;
use atelier_tools::ToolRegistry;
use std::sync::Arc;

/// Runs chat turns against one model and one tool registry
#[derive(Clone)]
pub struct ChatOrchestrator {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    config: OrchestratorConfig,
}

impl ChatOrchestrator {
    /// Create a new orchestrator
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
        }
    }

    /// Orchestrator configuration
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Tool registry bound to the model
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Name of the model provider
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("provider", &self.provider.name())
            .field("tools", &self.registry.list_names())
            .field("config", &self.config)
            .finish()
    }
}
