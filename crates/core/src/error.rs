use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pdf extraction failed: {0}")]
    Extraction(String),

    #[error("embedding generation failed: {0}")]
    Embedding(String),

    #[error("{backend} store error: {details}")]
    Store { backend: String, details: String },

    #[error("{0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl PipelineError {
    pub fn store(backend: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Store {
            backend: backend.into(),
            details: details.into(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
