use papers_ollama::OllamaError;
use papers_qdrant::QdrantError;

#[derive(thiserror::Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embed(#[source] OllamaError),
    #[error("Generation error: {0}")]
    Generate(#[source] OllamaError),
    #[error("Vector store error: {0}")]
    Store(#[from] QdrantError),
    #[error("Embedding has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Malformed document {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("Query is empty")]
    EmptyQuery,
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used to decide how a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A remote service was unreachable or answered with an error.
    Network,
    /// The input (document, vector, query) was unusable.
    Data,
    /// Local state or configuration could not be read or written.
    Local,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Embed(_) | RagError::Generate(_) => ErrorKind::Network,
            // Qdrant answers 400 for vector-size mismatches; that is bad data, not a bad network.
            RagError::Store(e) if e.status() == Some(400) => ErrorKind::Data,
            RagError::Store(_) => ErrorKind::Network,
            RagError::DimensionMismatch { .. }
            | RagError::Malformed { .. }
            | RagError::EmptyQuery => ErrorKind::Data,
            RagError::Config(_) | RagError::Io(_) | RagError::Json(_) => ErrorKind::Local,
        }
    }

    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        RagError::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
