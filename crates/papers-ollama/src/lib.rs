//! Minimal async client for the parts of the Ollama REST API used by papers:
//! embeddings, non-streaming generation and the model list.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DEFAULT_BASE_URL, DEFAULT_EMBED_MODEL, DEFAULT_GENERATE_MODEL, OllamaClient};
pub use error::{OllamaError, Result};
pub use types::ModelInfo;
