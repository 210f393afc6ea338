use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1_536;

/// Remote providers rate-limit per request; batches are issued sequentially
/// and a single failed batch aborts the whole call.
pub const EMBEDDING_BATCH_SIZE: usize = 16;

/// Converts text to fixed-dimension float vectors, one per input string,
/// order-preserving.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Cheap configuration check for the readiness probe; does not verify
    /// live connectivity.
    fn check_ready(&self) -> Result<()>;
}

#[async_trait]
impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<T> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts).await
    }

    fn check_ready(&self) -> Result<()> {
        (**self).check_ready()
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Adapter for an Azure-OpenAI-compatible embeddings deployment.
pub struct RemoteEmbedder {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    deployment: String,
    api_version: String,
    dimensions: usize,
}

impl RemoteEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key,
            deployment: deployment.into(),
            api_version: api_version.into(),
            dimensions,
        }
    }

    async fn embed_batch(&self, batch: &[String], api_key: &str) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!(
                "{}/openai/deployments/{}/embeddings",
                self.endpoint, self.deployment
            ))
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", api_key)
            .json(&EmbeddingRequest { input: batch })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::Embedding(format!(
                "embedding endpoint returned {}",
                response.status()
            )));
        }

        let payload: EmbeddingResponse = response.json().await?;
        if payload.data.len() != batch.len() {
            return Err(PipelineError::Embedding(format!(
                "expected {} embeddings, provider returned {}",
                batch.len(),
                payload.data.len()
            )));
        }

        let mut items = payload.data;
        items.sort_by_key(|item| item.index);
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::Embedding("api key not configured".to_string()))?;

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            let batch_embeddings = self.embed_batch(batch, api_key).await?;
            embeddings.extend(batch_embeddings);
        }

        debug!(count = embeddings.len(), "generated remote embeddings");
        Ok(embeddings)
    }

    fn check_ready(&self) -> Result<()> {
        if self.api_key.is_none() {
            return Err(PipelineError::Embedding(
                "embedding api key not configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Local deterministic fallback model: hashed character trigrams bucketed
/// into a normalized vector. Inference runs on a blocking worker so it never
/// stalls the request task.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    pub dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashEmbedder {
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let owned = texts.to_vec();
        let model = *self;

        let embeddings = tokio::task::spawn_blocking(move || {
            owned
                .iter()
                .map(|text| model.embed_one(text))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|error| PipelineError::Embedding(format!("local model task failed: {error}")))?;

        Ok(embeddings)
    }

    fn check_ready(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_model_is_deterministic() {
        let embedder = HashEmbedder::default();
        let first = embedder.embed_one("retrieval augmented generation");
        let second = embedder.embed_one("retrieval augmented generation");
        assert_eq!(first, second);
    }

    #[test]
    fn local_model_outputs_expected_length() {
        let embedder = HashEmbedder { dimensions: 32 };
        assert_eq!(embedder.embed_one("abc").len(), 32);
    }

    #[test]
    fn local_vectors_are_normalized() {
        let embedder = HashEmbedder { dimensions: 64 };
        let vector = embedder.embed_one("some chunk of document text");
        let magnitude: f32 = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn local_model_preserves_input_order() {
        let embedder = HashEmbedder { dimensions: 16 };
        let texts = vec!["first".to_string(), "second".to_string()];

        let embeddings = embedder.embed(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0], embedder.embed_one("first"));
        assert_eq!(embeddings[1], embedder.embed_one("second"));
    }

    #[test]
    fn remote_without_key_is_not_ready() {
        let embedder = RemoteEmbedder::new(
            "https://example.openai.azure.com",
            None,
            "text-embedding-ada-002",
            "2024-02-01",
            DEFAULT_EMBEDDING_DIMENSIONS,
        );
        assert!(embedder.check_ready().is_err());
    }

    #[test]
    fn remote_with_key_is_ready() {
        let embedder = RemoteEmbedder::new(
            "https://example.openai.azure.com",
            Some("secret".to_string()),
            "text-embedding-ada-002",
            "2024-02-01",
            DEFAULT_EMBEDDING_DIMENSIONS,
        );
        assert!(embedder.check_ready().is_ok());
    }
}
