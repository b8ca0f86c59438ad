//! Atelier Tools - tool registry and generation protocol
//!
//! This crate provides the tool side of a chat turn:
//! - Registry: tool registration, validation and dispatch
//! - Status: the UI message stream vocabulary and `StatusEmitter`
//! - Generation: the per-tool-call state machine driving an image provider
//! - Builtins: `createImage`, `editImage`, `describeImage`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtins;
pub mod error;
pub mod generation;
pub mod registry;
pub mod status;

pub use builtins::{register_builtins, BuiltinsConfig};
pub use error::{Error, Result};
pub use generation::{
    run_generation, GenerationOutcome, GenerationRequest, GenerationTask, ImagingSettings,
    INVALID_API_KEY_MESSAGE,
};
pub use registry::{Tool, ToolContext, ToolDefinition, ToolRegistry};
pub use status::{
    GenerationStatus, GenerationStatusKind, ImageDescription, StatusEmitter, UiEvent,
};
