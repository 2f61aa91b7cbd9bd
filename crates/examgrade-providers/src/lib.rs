//! examgrade-providers — model clients.
//!
//! Implements the `ResponseGenerator` trait for a local Ollama backend and
//! for OpenAI-compatible APIs, selected per model by [`ModelClient`].

pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;
mod stream;

pub use client::ModelClient;
pub use config::{load_config, load_config_from, ExternalModelConfig, GraderConfig};
pub use error::ProviderError;
