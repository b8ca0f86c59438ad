//! Atelier Imaging - image provider and object storage
//!
//! This crate talks to the hosted image generation service:
//! - `ImagingClient`: streaming generation, storage upload and persistence
//! - `FalClient`: fal.ai queue-less streaming endpoints and CDN storage
//! - `ImageFetcher`: bounded download of provider results and data URLs
//! - `SimulatedImagingClient`: offline test mode with a fixed mock image
//! - `ScriptedImagingClient` / `MemoryStorage`: in-process doubles for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod fal;
pub mod fetch;
pub mod memory;
pub mod simulated;
pub mod sse;
pub mod types;

pub use client::{ClientFactory, GenerationStream, ImagingClient};
pub use error::{Error, Result};
pub use fal::{FalClient, FalClientFactory, FalConfig};
pub use fetch::{FetchedImage, ImageFetcher};
pub use memory::{MemoryStorage, ScriptedImagingClient};
pub use simulated::{SimulatedClientFactory, SimulatedImagingClient};
pub use types::{
    GenerationInput, GenerationKind, GenerationOutput, ImageSize, InferenceConfig, LoraWeight,
    OutputData, ProviderImage, ResolutionMode,
};
