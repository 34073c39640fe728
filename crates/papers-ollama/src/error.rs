#[derive(thiserror::Error, Debug)]
pub enum OllamaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model {0} returned an empty embedding")]
    EmptyEmbedding(String),
}

impl OllamaError {
    /// True when the server could not be reached or the connection broke mid-request.
    pub fn is_transport(&self) -> bool {
        matches!(self, OllamaError::Http(e) if e.is_connect() || e.is_timeout() || e.is_request())
    }
}

pub type Result<T> = std::result::Result<T, OllamaError>;
