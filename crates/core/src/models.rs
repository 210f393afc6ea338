use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file received from a client, prior to any processing.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
}

/// The unit persisted in the vector index. The identifier is assigned by the
/// index adapter at write time, never derived from content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub embedding: Vec<f32>,
    pub text: String,
    pub filename: String,
    pub chunk_id: u32,
}

/// One ranked hit from a nearest-neighbor search. Higher score means more
/// similar; the score scale is backend-defined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub score: f64,
    pub filename: String,
    pub chunk_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub filename: String,
    pub chunks: usize,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub files: Vec<ProcessedFile>,
    pub completed_at: DateTime<Utc>,
}

/// Result of a semantic-search request. The echoed query and hit filenames
/// have already passed through the sensitive-data masker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    pub results: Vec<SearchHit>,
}
