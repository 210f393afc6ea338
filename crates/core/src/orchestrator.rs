use crate::chunking::{chunk_text, ChunkingConfig};
use crate::embeddings::EmbeddingProvider;
use crate::error::{PipelineError, Result};
use crate::extractor::TextExtractor;
use crate::masking::{hash_identifier, mask_sensitive_data};
use crate::models::{IngestReport, ProcessedFile, QueryOutcome, UploadedFile, VectorRecord};
use crate::stores::{ObjectStore, VectorIndex};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

pub const DEFAULT_TOP_K: usize = 5;

/// Sequences the ingestion and query pipelines across the extractor, the
/// embedding provider, the object store, and the vector index. Stateless
/// between requests; share one instance behind an `Arc`.
pub struct RagPipeline<X, E, O, V>
where
    X: TextExtractor,
    E: EmbeddingProvider,
    O: ObjectStore,
    V: VectorIndex,
{
    extractor: X,
    embedder: E,
    blob: O,
    index: V,
    chunking: ChunkingConfig,
}

impl<X, E, O, V> RagPipeline<X, E, O, V>
where
    X: TextExtractor + Send + Sync,
    E: EmbeddingProvider + Send + Sync,
    O: ObjectStore + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    pub fn new(extractor: X, embedder: E, blob: O, index: V, chunking: ChunkingConfig) -> Self {
        Self {
            extractor,
            embedder,
            blob,
            index,
            chunking,
        }
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub fn blob_store(&self) -> &O {
        &self.blob
    }

    /// Processes a batch of uploaded files: extract, chunk, embed, store
    /// vectors, then persist the raw bytes. Non-PDF entries are skipped with
    /// a warning; the first failing file aborts the whole batch, and files
    /// already processed in the same batch are not rolled back.
    ///
    /// The raw-blob write is the last step so a malformed PDF never leaves
    /// an orphaned blob; if that write fails, the vector records just stored
    /// for the file are compensated with a delete.
    pub async fn ingest(&self, files: Vec<UploadedFile>) -> Result<IngestReport> {
        info!(count = files.len(), "received files for processing");
        let mut processed = Vec::new();

        for file in files {
            if !file.filename.to_ascii_lowercase().ends_with(".pdf") {
                warn!(filename = %mask_sensitive_data(&file.filename), "skipping non-pdf file");
                continue;
            }

            let chunk_count = self.ingest_file(&file).await?;
            processed.push(ProcessedFile {
                filename: file.filename,
                chunks: chunk_count,
                status: "success".to_string(),
            });
        }

        Ok(IngestReport {
            files: processed,
            completed_at: Utc::now(),
        })
    }

    async fn ingest_file(&self, file: &UploadedFile) -> Result<usize> {
        let checksum = {
            let mut hasher = Sha256::new();
            hasher.update(&file.content);
            format!("{:x}", hasher.finalize())
        };
        info!(
            file = %hash_identifier(&file.filename),
            bytes = file.content.len(),
            checksum = %&checksum[..16],
            "processing file"
        );

        let text = self.extractor.extract(&file.content, &file.filename)?;
        let chunks = chunk_text(&text, &self.chunking);

        if chunks.is_empty() {
            warn!(file = %hash_identifier(&file.filename), "no chunks produced");
            self.blob.upload(&file.filename, &file.content).await?;
            return Ok(0);
        }

        let embeddings = self.embedder.embed(&chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(PipelineError::Embedding(format!(
                "provider returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let records = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(ordinal, (chunk, embedding))| VectorRecord {
                embedding,
                text: chunk.clone(),
                filename: file.filename.clone(),
                chunk_id: ordinal as u32,
            })
            .collect::<Vec<_>>();

        let ids = self.index.store(records).await?;
        info!(count = ids.len(), "stored vectors for file");

        if let Err(error) = self.blob.upload(&file.filename, &file.content).await {
            warn!(
                file = %hash_identifier(&file.filename),
                error = %error,
                "blob upload failed, removing vectors just written"
            );
            if let Err(cleanup_error) = self
                .index
                .delete_by_field("filename", &file.filename)
                .await
            {
                warn!(error = %cleanup_error, "compensating vector delete also failed");
            }
            return Err(error);
        }

        Ok(chunks.len())
    }

    /// Embeds the query text, runs a nearest-neighbor search, and masks the
    /// filenames in the returned metadata. The query itself is embedded
    /// unmasked; only the echoed copy is masked.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<QueryOutcome> {
        if text.trim().is_empty() {
            return Err(PipelineError::Validation("query is empty".to_string()));
        }

        info!(query = %mask_sensitive_data(text), top_k, "processing query");

        let embedded = self.embedder.embed(&[text.to_string()]).await?;
        let query_vector = embedded
            .first()
            .ok_or_else(|| PipelineError::Embedding("provider returned no vector".to_string()))?;

        let mut results = self.index.search(query_vector, top_k).await?;
        for hit in &mut results {
            hit.filename = mask_sensitive_data(&hit.filename);
        }
        info!(count = results.len(), "retrieved results from vector store");

        Ok(QueryOutcome {
            query: mask_sensitive_data(text),
            results,
        })
    }

    /// Deletes a document's vector records and its blob. Requires an
    /// explicit confirmation flag; refuses before touching any store
    /// without it. The two deletions are independent and not transactional:
    /// a blob failure after the vector delete leaves a partially-deleted
    /// document.
    pub async fn delete(&self, filename: &str, confirm: bool) -> Result<usize> {
        if !confirm {
            return Err(PipelineError::Validation(
                "Destructive operation requires explicit confirmation. Set confirm=true"
                    .to_string(),
            ));
        }

        warn!(file = %hash_identifier(filename), "deleting document");

        let removed = self.index.delete_by_field("filename", filename).await?;
        info!(count = removed, "deleted vectors from index");

        self.blob.delete(filename).await?;

        Ok(removed)
    }

    /// Liveness: the vector index must respond.
    pub async fn check_health(&self) -> Result<()> {
        self.index.check_ready().await
    }

    /// Readiness: index reachable and embedding provider configured.
    pub async fn check_ready(&self) -> Result<()> {
        self.index.check_ready().await?;
        self.embedder.check_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::stores::{MemoryBlobStore, MemoryVectorIndex};
    use async_trait::async_trait;

    struct FakeExtractor {
        text: String,
    }

    impl TextExtractor for FakeExtractor {
        fn extract(&self, _content: &[u8], _filename: &str) -> Result<String> {
            Ok(self.text.clone())
        }
    }

    struct FailingBlobStore;

    #[async_trait]
    impl ObjectStore for FailingBlobStore {
        async fn upload(&self, filename: &str, _content: &[u8]) -> Result<String> {
            Err(PipelineError::store(
                "blob",
                format!("upload of {filename} refused"),
            ))
        }

        async fn delete(&self, _filename: &str) -> Result<()> {
            Ok(())
        }
    }

    fn pipeline_with(
        text: &str,
        blob: MemoryBlobStore,
    ) -> RagPipeline<FakeExtractor, HashEmbedder, MemoryBlobStore, MemoryVectorIndex> {
        RagPipeline::new(
            FakeExtractor {
                text: text.to_string(),
            },
            HashEmbedder { dimensions: 16 },
            blob,
            MemoryVectorIndex::new(),
            ChunkingConfig::default(),
        )
    }

    fn upload(filename: &str) -> UploadedFile {
        UploadedFile {
            filename: filename.to_string(),
            content: b"%PDF-1.4 stand-in".to_vec(),
        }
    }

    #[tokio::test]
    async fn ingest_chunks_embeds_and_stores() {
        let text: String = ('a'..='z').cycle().take(2_500).collect();
        let pipeline = pipeline_with(&text, MemoryBlobStore::default());

        let report = pipeline.ingest(vec![upload("doc.pdf")]).await.unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].chunks, 4);
        assert_eq!(report.files[0].status, "success");
        assert_eq!(pipeline.index().len(), 4);
    }

    #[tokio::test]
    async fn non_pdf_files_are_skipped_not_failed() {
        let pipeline = pipeline_with("some text", MemoryBlobStore::default());

        let report = pipeline
            .ingest(vec![upload("notes.txt"), upload("doc.pdf")])
            .await
            .unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].filename, "doc.pdf");
    }

    #[tokio::test]
    async fn empty_extraction_stores_no_vectors_but_keeps_the_blob() {
        let pipeline = pipeline_with("   \n  ", MemoryBlobStore::default());

        let report = pipeline.ingest(vec![upload("scanned.pdf")]).await.unwrap();

        assert_eq!(report.files[0].chunks, 0);
        assert_eq!(pipeline.index().len(), 0);
        assert!(pipeline.blob_store().contains("scanned.pdf"));
    }

    #[tokio::test]
    async fn failed_blob_upload_compensates_stored_vectors() {
        let pipeline = RagPipeline::new(
            FakeExtractor {
                text: "enough text to produce a chunk".to_string(),
            },
            HashEmbedder { dimensions: 16 },
            FailingBlobStore,
            MemoryVectorIndex::new(),
            ChunkingConfig::default(),
        );

        let result = pipeline.ingest(vec![upload("doc.pdf")]).await;

        assert!(result.is_err());
        assert_eq!(pipeline.index().len(), 0);
    }

    #[tokio::test]
    async fn query_against_empty_index_returns_no_results() {
        let pipeline = pipeline_with("unused", MemoryBlobStore::default());

        let outcome = pipeline.query("anything at all", 3).await.unwrap();

        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn query_masks_filenames_and_echoed_text() {
        let pipeline = pipeline_with(&"x".repeat(500), MemoryBlobStore::default());
        pipeline
            .ingest(vec![upload("john.doe@example.com.pdf")])
            .await
            .unwrap();

        let outcome = pipeline
            .query("mail me at john.doe@example.com", 5)
            .await
            .unwrap();

        assert_eq!(outcome.query, "mail me at joh*****.com");
        assert!(!outcome.results.is_empty());
        assert!(outcome.results[0].filename.contains("*****"));
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let pipeline = pipeline_with("unused", MemoryBlobStore::default());
        let result = pipeline.query("   ", DEFAULT_TOP_K).await;
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }

    #[tokio::test]
    async fn delete_without_confirmation_touches_nothing() {
        let pipeline = pipeline_with(&"y".repeat(500), MemoryBlobStore::default());
        pipeline.ingest(vec![upload("doc.pdf")]).await.unwrap();

        let result = pipeline.delete("doc.pdf", false).await;

        assert!(matches!(result, Err(PipelineError::Validation(_))));
        assert_eq!(pipeline.index().len(), 1);
    }

    #[tokio::test]
    async fn confirmed_delete_removes_vectors_and_reports_count() {
        let text: String = ('a'..='z').cycle().take(2_500).collect();
        let pipeline = pipeline_with(&text, MemoryBlobStore::default());
        pipeline
            .ingest(vec![upload("doc.pdf")])
            .await
            .unwrap();

        let removed = pipeline.delete("doc.pdf", true).await.unwrap();

        assert_eq!(removed, 4);
        assert_eq!(pipeline.index().len(), 0);
    }
}
