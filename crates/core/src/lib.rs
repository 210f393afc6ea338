pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod masking;
pub mod models;
pub mod orchestrator;
pub mod stores;

pub use chunking::{chunk_text, ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use config::{AppConfig, BlobSettings, EmbeddingSettings, IndexSettings};
pub use embeddings::{
    EmbeddingProvider, HashEmbedder, RemoteEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    EMBEDDING_BATCH_SIZE,
};
pub use error::{PipelineError, Result};
pub use extractor::{PdfTextExtractor, TextExtractor};
pub use masking::{hash_identifier, mask_sensitive_data};
pub use models::{
    IngestReport, ProcessedFile, QueryOutcome, SearchHit, UploadedFile, VectorRecord,
};
pub use orchestrator::{RagPipeline, DEFAULT_TOP_K};
pub use stores::{
    AzureBlobStore, AzureSearchIndex, MemoryBlobStore, MemoryVectorIndex, ObjectStore, VectorIndex,
};
