//! Registry - Tool registration and dispatch
//!
//! Tools are registered once at startup and shared by every chat request.
//! Per-request state (the tool call id, the outbound stream, the imaging
//! client bound to the caller's credential) travels in a [`ToolContext`].

use crate::error::{Error, Result};
use crate::status::StatusEmitter;
use atelier_imaging::ImagingClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Tool metadata and schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// Description shown to the model
    pub description: String,
    /// JSON schema for parameters
    pub parameters: serde_json::Value,
    /// Whether the tool is offered to the model
    pub enabled: bool,
}

impl ToolDefinition {
    /// Create a new tool definition
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            enabled: true,
        }
    }

    /// Set the parameters schema
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set enabled status
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Per-call execution context
#[derive(Clone)]
pub struct ToolContext {
    /// Id the model assigned to this call
    pub tool_call_id: String,
    /// Outbound stream of the request
    pub emitter: StatusEmitter,
    /// Image provider bound to the request's credential
    pub imaging: Arc<dyn ImagingClient>,
    /// Cancelled when the client disconnects
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// Context for one tool call; shares the emitter's cancellation token
    #[must_use]
    pub fn new(
        tool_call_id: impl Into<String>,
        emitter: StatusEmitter,
        imaging: Arc<dyn ImagingClient>,
    ) -> Self {
        let cancel = emitter.cancellation_token().clone();
        Self {
            tool_call_id: tool_call_id.into(),
            emitter,
            imaging,
            cancel,
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("tool_call_id", &self.tool_call_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Trait for tool implementations
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition
    fn definition(&self) -> &ToolDefinition;

    /// Execute the tool with validated input
    async fn execute(&self, ctx: ToolContext, input: serde_json::Value)
        -> Result<serde_json::Value>;

    /// Validate input before execution
    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        if !input.is_object() {
            return Err(Error::InvalidInput("Input must be an object".to_string()));
        }
        Ok(())
    }
}

/// Registry for managing tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    definitions: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let def = tool.definition();
        let name = def.name.clone();
        debug!(tool = %name, "Registering tool");
        self.definitions.insert(name.clone(), def.clone());
        self.tools.insert(name, tool);
    }

    /// Get a tool by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool exists
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all tool names, sorted
    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Enable or disable a tool; returns false for unknown names
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.definitions.get_mut(name) {
            Some(def) => {
                def.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Get tool count
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Enabled definitions in LLM tool format, sorted by name
    #[must_use]
    pub fn to_llm_tools(&self) -> Vec<atelier_llm::ToolDefinition> {
        let mut defs: Vec<&ToolDefinition> =
            self.definitions.values().filter(|d| d.enabled).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs.into_iter()
            .map(|def| {
                atelier_llm::ToolDefinition::new(&def.name, &def.description, def.parameters.clone())
            })
            .collect()
    }

    /// Validate and run a tool
    ///
    /// # Errors
    /// `NotFound` for unknown or disabled tools, `InvalidInput` when validation
    /// rejects the arguments, otherwise whatever the tool returns.
    pub async fn execute(
        &self,
        name: &str,
        ctx: ToolContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let enabled = self.definitions.get(name).is_some_and(|d| d.enabled);
        let tool = self
            .get(name)
            .filter(|_| enabled)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        if let Err(e) = tool.validate_input(&input) {
            warn!(tool = %name, tool_call_id = %ctx.tool_call_id, error = %e, "Rejected tool input");
            return Err(e);
        }

        let start = Instant::now();
        let tool_call_id = ctx.tool_call_id.clone();
        let result = tool.execute(ctx, input).await;
        debug!(
            tool = %name,
            tool_call_id = %tool_call_id,
            duration_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Tool finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_imaging::ScriptedImagingClient;

    struct EchoTool {
        definition: ToolDefinition,
    }

    impl EchoTool {
        fn new(name: &str) -> Self {
            Self {
                definition: ToolDefinition::new(name, "Echo the input"),
            }
        }
    }

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn execute(
            &self,
            _ctx: ToolContext,
            input: serde_json::Value,
        ) -> Result<serde_json::Value> {
            Ok(input)
        }
    }

    fn context() -> ToolContext {
        let (emitter, _rx) = StatusEmitter::channel(8, CancellationToken::new());
        ToolContext::new("call_1", emitter, Arc::new(ScriptedImagingClient::new()))
    }

    #[test]
    fn test_registry_operations() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(EchoTool::new("b_tool")));
        registry.register(Arc::new(EchoTool::new("a_tool")));

        assert_eq!(registry.len(), 2);
        assert!(registry.has("a_tool"));
        assert_eq!(registry.list_names(), vec!["a_tool", "b_tool"]);

        let llm_tools = registry.to_llm_tools();
        assert_eq!(llm_tools[0].name, "a_tool");

        assert!(registry.set_enabled("a_tool", false));
        assert_eq!(registry.to_llm_tools().len(), 1);
        assert!(!registry.set_enabled("missing", false));
    }

    #[tokio::test]
    async fn test_execute_dispatches_and_validates() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("echo")));

        let out = registry
            .execute("echo", context(), serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(out["x"], 1);

        let err = registry
            .execute("echo", context(), serde_json::json!("not an object"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = registry
            .execute("nope", context(), serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
