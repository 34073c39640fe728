use std::path::PathBuf;

use papers_ollama::OllamaClient;
use papers_qdrant::QdrantClient;

use crate::error::{RagError, Result};

pub const DEFAULT_COLLECTION: &str = "papers";
pub const DEFAULT_EMBED_DIM: usize = 768;
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const DEFAULT_MARKDOWN_DIR: &str = "markdowns";
const DEFAULT_QDRANT_PORT: u16 = 6333;
const DEFAULT_OLLAMA_PORT: u16 = 11434;
const TRACKER_FILE: &str = "processed_papers.json";

/// Everything the pipelines need to reach their collaborators.
///
/// Built explicitly (`RagConfig::builder()`) or from the environment
/// (`RagConfig::from_env()`), then handed to whoever constructs clients.
#[derive(Debug, Clone, bon::Builder)]
pub struct RagConfig {
    #[builder(into, default = format!("http://localhost:{DEFAULT_QDRANT_PORT}"))]
    pub qdrant_url: String,
    #[builder(into)]
    pub qdrant_api_key: Option<String>,
    #[builder(into, default = DEFAULT_COLLECTION.to_string())]
    pub collection: String,
    #[builder(into, default = format!("http://localhost:{DEFAULT_OLLAMA_PORT}"))]
    pub ollama_url: String,
    #[builder(into, default = papers_ollama::DEFAULT_EMBED_MODEL.to_string())]
    pub embed_model: String,
    #[builder(into, default = papers_ollama::DEFAULT_GENERATE_MODEL.to_string())]
    pub llm_model: String,
    #[builder(default = DEFAULT_EMBED_DIM)]
    pub embed_dim: usize,
    #[builder(default = DEFAULT_SEARCH_LIMIT)]
    pub search_limit: usize,
    #[builder(into, default = PathBuf::from(DEFAULT_MARKDOWN_DIR))]
    pub markdown_dir: PathBuf,
    #[builder(into, default = default_tracker_path())]
    pub tracker_path: PathBuf,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RagConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unset and blank
    /// variables fall back to defaults; unparsable numbers are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let qdrant_url = match var("QDRANT_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => service_url(
                var("QDRANT_HOST").as_deref(),
                var("QDRANT_PORT").as_deref(),
                DEFAULT_QDRANT_PORT,
                "QDRANT_PORT",
            )?,
        };
        let ollama_url = match var("OLLAMA_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => service_url(
                var("OLLAMA_HOST").as_deref(),
                var("OLLAMA_PORT").as_deref(),
                DEFAULT_OLLAMA_PORT,
                "OLLAMA_PORT",
            )?,
        };

        let embed_dim = parse_positive(var("PAPERS_EMBED_DIM"), "PAPERS_EMBED_DIM", DEFAULT_EMBED_DIM)?;
        let search_limit = parse_positive(
            var("PAPERS_SEARCH_LIMIT"),
            "PAPERS_SEARCH_LIMIT",
            DEFAULT_SEARCH_LIMIT,
        )?;

        let tracker_path = var("PAPERS_TRACKER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| tracker_path_under(var("PAPERS_DATA_DIR").map(PathBuf::from)));

        Ok(Self::builder()
            .qdrant_url(qdrant_url)
            .maybe_qdrant_api_key(var("QDRANT_API_KEY"))
            .collection(var("QDRANT_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.to_string()))
            .ollama_url(ollama_url)
            .embed_model(
                var("PAPERS_EMBED_MODEL")
                    .unwrap_or_else(|| papers_ollama::DEFAULT_EMBED_MODEL.to_string()),
            )
            .llm_model(
                var("PAPERS_LLM_MODEL")
                    .unwrap_or_else(|| papers_ollama::DEFAULT_GENERATE_MODEL.to_string()),
            )
            .embed_dim(embed_dim)
            .search_limit(search_limit)
            .markdown_dir(
                var("PAPERS_MARKDOWN_DIR").unwrap_or_else(|| DEFAULT_MARKDOWN_DIR.to_string()),
            )
            .tracker_path(tracker_path)
            .build())
    }

    pub fn ollama_client(&self) -> OllamaClient {
        OllamaClient::new()
            .with_base_url(&self.ollama_url)
            .with_embed_model(&self.embed_model)
            .with_generate_model(&self.llm_model)
    }

    pub fn qdrant_client(&self) -> QdrantClient {
        let client = QdrantClient::new().with_base_url(&self.qdrant_url);
        match &self.qdrant_api_key {
            Some(key) => client.with_api_key(key),
            None => client,
        }
    }
}

/// Default tracker location: `$PAPERS_DATA_DIR/rag/processed_papers.json`, or the
/// platform data dir (`.../papers/rag/...`), or `.papers/rag/...` as a last resort.
pub fn default_tracker_path() -> PathBuf {
    tracker_path_under(std::env::var("PAPERS_DATA_DIR").ok().map(PathBuf::from))
}

fn tracker_path_under(data_dir: Option<PathBuf>) -> PathBuf {
    let base = data_dir
        .or_else(|| dirs::data_dir().map(|d| d.join("papers")))
        .unwrap_or_else(|| PathBuf::from(".papers"));
    base.join("rag").join(TRACKER_FILE)
}

/// Combine a host and port variable into a base URL. The host may already
/// carry a scheme (`http://ollama:11434`) or a port (`ollama:11434`), the way
/// `OLLAMA_HOST` is commonly set.
fn service_url(
    host: Option<&str>,
    port: Option<&str>,
    default_port: u16,
    port_var: &str,
) -> Result<String> {
    let host = host.unwrap_or("localhost").trim_end_matches('/');
    if host.contains("://") {
        return Ok(host.to_string());
    }
    if host.contains(':') {
        return Ok(format!("http://{host}"));
    }
    let port = match port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| RagError::Config(format!("{port_var} must be a port number, got {p:?}")))?,
        None => default_port,
    };
    Ok(format!("http://{host}:{port}"))
}

fn parse_positive(value: Option<String>, name: &str, default: usize) -> Result<usize> {
    match value {
        None => Ok(default),
        Some(v) => match v.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(RagError::Config(format!(
                "{name} must be a positive integer, got {v:?}"
            ))),
        },
    }
}
