#[derive(thiserror::Error, Debug)]
pub enum QdrantError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QdrantError {
    /// True when the server could not be reached or the connection broke mid-request.
    pub fn is_transport(&self) -> bool {
        matches!(self, QdrantError::Http(e) if e.is_connect() || e.is_timeout() || e.is_request())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            QdrantError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, QdrantError>;
