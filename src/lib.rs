//! Atelier - chat image generation assistant server
//!
//! The HTTP surface of Atelier. Library crates do the work:
//! - `atelier-core`: credential gate, rate limiting, the chat model loop
//! - `atelier-tools`: image tools and the UI message stream
//! - `atelier-imaging`: image provider and storage
//! - `atelier-llm`: chat model providers

#![forbid(unsafe_code)]

pub mod api;
pub mod cli;
pub mod middleware;
pub mod server;
