//! Atelier Core - chat turn orchestration
//!
//! This crate ties the model, the tools and the image provider together:
//! - Gate: caller key passthrough or the shared key behind a rate limiter
//! - Normalizer: folds multi-part user turns into one model-facing context
//! - Orchestrator: the streamed model loop with tool execution
//! - Styles: the built-in LoRA style catalog
//! - Utils: fixed-window rate limiting over memory or Redis

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod gate;
pub mod normalizer;
pub mod orchestrator;
pub mod styles;
pub mod utils;

pub use error::{format_error_for_chat, Error, Result, UserFriendlyError, RATE_LIMIT_MESSAGE};
pub use gate::{ClientHandle, CredentialGate, GateError, KeySource};
pub use normalizer::{
    normalize_messages, to_model_messages, ChatMessage, LoraSelection, MessagePart, Role,
    ToolPart, TurnContext,
};
pub use orchestrator::{ChatOrchestrator, OrchestratorConfig, DEFAULT_MAX_STEPS, SYSTEM_PROMPT};
pub use styles::{find_style, StyleModel, STYLES};
pub use utils::{
    FixedWindowLimiter, MemoryRateLimitStore, RateLimitConfig, RateLimitResult, RateLimitStore,
    RedisRateLimitStore,
};
