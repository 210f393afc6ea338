use crate::chunking::ChunkingConfig;
use crate::embeddings::{
    EmbeddingProvider, HashEmbedder, RemoteEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
use crate::error::{PipelineError, Result};
use crate::stores::{
    AzureBlobStore, AzureSearchIndex, MemoryBlobStore, MemoryVectorIndex, ObjectStore, VectorIndex,
};
use tracing::warn;
use url::Url;

const DEFAULT_CONTAINER: &str = "pdf-documents";
const DEFAULT_INDEX_NAME: &str = "rag-documents";
const DEFAULT_DEPLOYMENT: &str = "text-embedding-ada-002";
const DEFAULT_API_VERSION: &str = "2024-02-01";

/// Service configuration assembled from environment variables at startup.
/// Each external collaborator independently degrades to its in-memory mock
/// when the relevant credentials are absent, so the pipeline runs without
/// live cloud dependencies.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chunking: ChunkingConfig,
    pub dimensions: usize,
    pub embedding: EmbeddingSettings,
    pub blob: BlobSettings,
    pub index: IndexSettings,
}

#[derive(Debug, Clone)]
pub enum EmbeddingSettings {
    Remote {
        endpoint: String,
        api_key: Option<String>,
        deployment: String,
        api_version: String,
    },
    Local,
}

#[derive(Debug, Clone)]
pub enum BlobSettings {
    Azure {
        account_url: String,
        container: String,
        sas_token: Option<String>,
    },
    Mock {
        container: String,
    },
}

#[derive(Debug, Clone)]
pub enum IndexSettings {
    Azure {
        endpoint: String,
        api_key: String,
        index_name: String,
    },
    Mock,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |name: &str| {
            lookup(name).and_then(|value| {
                let trimmed = value.trim().to_string();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed)
                }
            })
        };

        let chunk_size = parse_usize(&lookup, "CHUNK_SIZE", ChunkingConfig::default().chunk_size())?;
        let chunk_overlap = parse_usize(
            &lookup,
            "CHUNK_OVERLAP",
            ChunkingConfig::default().chunk_overlap(),
        )?;
        let chunking = ChunkingConfig::new(chunk_size, chunk_overlap)?;

        let dimensions = parse_usize(&lookup, "VECTOR_DIMENSIONS", DEFAULT_EMBEDDING_DIMENSIONS)?;

        let embedding = match lookup("AZURE_OPENAI_ENDPOINT") {
            Some(endpoint) => {
                Url::parse(&endpoint)?;
                EmbeddingSettings::Remote {
                    endpoint,
                    api_key: lookup("AZURE_OPENAI_API_KEY"),
                    deployment: lookup("AZURE_OPENAI_EMBEDDING_DEPLOYMENT")
                        .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string()),
                    api_version: lookup("AZURE_OPENAI_API_VERSION")
                        .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
                }
            }
            None => EmbeddingSettings::Local,
        };

        let container =
            lookup("AZURE_STORAGE_CONTAINER_NAME").unwrap_or_else(|| DEFAULT_CONTAINER.to_string());
        let blob = match lookup("AZURE_STORAGE_ACCOUNT_URL") {
            Some(account_url) => {
                Url::parse(&account_url)?;
                BlobSettings::Azure {
                    account_url,
                    container,
                    sas_token: lookup("AZURE_STORAGE_SAS_TOKEN"),
                }
            }
            None => BlobSettings::Mock { container },
        };

        let index = match (lookup("AZURE_SEARCH_ENDPOINT"), lookup("AZURE_SEARCH_API_KEY")) {
            (Some(endpoint), Some(api_key)) => {
                Url::parse(&endpoint)?;
                IndexSettings::Azure {
                    endpoint,
                    api_key,
                    index_name: lookup("AZURE_SEARCH_INDEX_NAME")
                        .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
                }
            }
            _ => IndexSettings::Mock,
        };

        Ok(Self {
            chunking,
            dimensions,
            embedding,
            blob,
            index,
        })
    }

    pub fn build_embedder(&self) -> Box<dyn EmbeddingProvider> {
        match &self.embedding {
            EmbeddingSettings::Remote {
                endpoint,
                api_key,
                deployment,
                api_version,
            } => Box::new(RemoteEmbedder::new(
                endpoint.clone(),
                api_key.clone(),
                deployment.clone(),
                api_version.clone(),
                self.dimensions,
            )),
            EmbeddingSettings::Local => {
                warn!("no embedding endpoint configured, using local hash model");
                Box::new(HashEmbedder {
                    dimensions: self.dimensions,
                })
            }
        }
    }

    pub fn build_blob_store(&self) -> Box<dyn ObjectStore> {
        match &self.blob {
            BlobSettings::Azure {
                account_url,
                container,
                sas_token,
            } => Box::new(AzureBlobStore::new(
                account_url.clone(),
                container.clone(),
                sas_token.clone(),
            )),
            BlobSettings::Mock { container } => {
                warn!("blob storage not configured, using mock mode");
                Box::new(MemoryBlobStore::new(container.clone()))
            }
        }
    }

    pub fn build_vector_index(&self) -> Box<dyn VectorIndex> {
        match &self.index {
            IndexSettings::Azure {
                endpoint,
                api_key,
                index_name,
            } => Box::new(AzureSearchIndex::new(
                endpoint.clone(),
                api_key.clone(),
                index_name.clone(),
                self.dimensions,
            )),
            IndexSettings::Mock => {
                warn!("search credentials not configured, using mock mode");
                Box::new(MemoryVectorIndex::new())
            }
        }
    }
}

fn parse_usize(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: usize,
) -> Result<usize> {
    match lookup(name) {
        Some(value) => value
            .parse()
            .map_err(|_| PipelineError::Config(format!("{name} is not a valid integer: {value}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn bare_environment_selects_mock_mode_everywhere() {
        let config = config_from(&[]).unwrap();

        assert!(matches!(config.embedding, EmbeddingSettings::Local));
        assert!(matches!(config.blob, BlobSettings::Mock { .. }));
        assert!(matches!(config.index, IndexSettings::Mock));
        assert_eq!(config.dimensions, DEFAULT_EMBEDDING_DIMENSIONS);
        assert_eq!(config.chunking.chunk_size(), 1_000);
        assert_eq!(config.chunking.chunk_overlap(), 200);
    }

    #[test]
    fn live_settings_are_picked_up() {
        let config = config_from(&[
            ("AZURE_OPENAI_ENDPOINT", "https://oai.example.net"),
            ("AZURE_OPENAI_API_KEY", "key-1"),
            ("AZURE_STORAGE_ACCOUNT_URL", "https://acct.blob.core.windows.net"),
            ("AZURE_SEARCH_ENDPOINT", "https://search.example.net"),
            ("AZURE_SEARCH_API_KEY", "key-2"),
            ("VECTOR_DIMENSIONS", "768"),
        ])
        .unwrap();

        assert!(matches!(config.embedding, EmbeddingSettings::Remote { .. }));
        assert!(matches!(config.blob, BlobSettings::Azure { .. }));
        assert!(matches!(config.index, IndexSettings::Azure { .. }));
        assert_eq!(config.dimensions, 768);
    }

    #[test]
    fn search_endpoint_without_key_stays_mock() {
        let config = config_from(&[("AZURE_SEARCH_ENDPOINT", "https://search.example.net")]).unwrap();
        assert!(matches!(config.index, IndexSettings::Mock));
    }

    #[test]
    fn invalid_chunk_overlap_is_rejected_at_startup() {
        let result = config_from(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "100")]);
        assert!(result.is_err());
    }

    #[test]
    fn non_numeric_dimensions_are_rejected() {
        let result = config_from(&[("VECTOR_DIMENSIONS", "lots")]);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn blank_values_are_treated_as_absent() {
        let config = config_from(&[("AZURE_OPENAI_ENDPOINT", "   ")]).unwrap();
        assert!(matches!(config.embedding, EmbeddingSettings::Local));
    }
}
