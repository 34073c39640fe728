use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::error::{OllamaError, Result};
use crate::types::{
    EmbeddingRequest, EmbeddingResponse, ErrorBody, GenerateOptions, GenerateRequest,
    GenerateResponse, ModelInfo, TagsResponse,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_GENERATE_MODEL: &str = "mistral";

/// Client for a local Ollama server.
///
/// One client serves both the embedding model and the generation model. Every
/// call is a single HTTP round trip; nothing is cached or retried.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    embed_model: String,
    generate_model: String,
    temperature: Option<f32>,
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            generate_model: DEFAULT_GENERATE_MODEL.to_string(),
            temperature: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    pub fn with_generate_model(mut self, model: impl Into<String>) -> Self {
        self.generate_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    pub fn generate_model(&self) -> &str {
        &self.generate_model
    }

    /// `POST /api/embeddings`: embed a single text with the configured embedding model.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        tracing::debug!(model = %self.embed_model, chars = text.len(), "requesting embedding");
        let body = EmbeddingRequest {
            model: &self.embed_model,
            prompt: text,
        };
        let resp = self.http.post(&url).json(&body).send().await?;
        let parsed: EmbeddingResponse = decode(resp).await?;
        if parsed.embedding.is_empty() {
            return Err(OllamaError::EmptyEmbedding(self.embed_model.clone()));
        }
        Ok(parsed.embedding)
    }

    /// `POST /api/generate` with `stream: false`: returns the full completion text.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        tracing::debug!(model = %self.generate_model, chars = prompt.len(), "requesting completion");
        let body = GenerateRequest {
            model: &self.generate_model,
            prompt,
            stream: false,
            options: self.temperature.map(|temperature| GenerateOptions { temperature }),
        };
        let resp = self.http.post(&url).json(&body).send().await?;
        let parsed: GenerateResponse = decode(resp).await?;
        Ok(parsed.response)
    }

    /// `GET /api/tags`: models available on the server.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self.http.get(&url).send().await?;
        let parsed: TagsResponse = decode(resp).await?;
        Ok(parsed.models)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(&bytes)
            .map(|b| b.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());
        return Err(OllamaError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(serde_json::from_slice(&bytes)?)
}
