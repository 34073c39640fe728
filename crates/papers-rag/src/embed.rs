use async_trait::async_trait;
use papers_ollama::OllamaClient;

use crate::error::{RagError, Result};

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Produces a completion for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        OllamaClient::embed(self, text).await.map_err(RagError::Embed)
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        OllamaClient::generate(self, prompt)
            .await
            .map_err(RagError::Generate)
    }
}

/// Embed and check the vector has the dimensionality the collection expects.
pub(crate) async fn embed_checked(
    embedder: &dyn Embedder,
    text: &str,
    expected: usize,
) -> Result<Vec<f32>> {
    let vector = embedder.embed(text).await?;
    if vector.len() != expected {
        return Err(RagError::DimensionMismatch {
            expected,
            got: vector.len(),
        });
    }
    Ok(vector)
}
