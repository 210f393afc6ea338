use crate::error::{PipelineError, Result};
use crate::models::{SearchHit, VectorRecord};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

const SEARCH_API_VERSION: &str = "2024-07-01";

/// Page size for the search half of search-then-delete.
const DELETE_PAGE_SIZE: usize = 1_000;

/// OData equality filter with embedded single quotes doubled, so a filename
/// like `o'brien.pdf` cannot break out of the string literal.
fn odata_eq_filter(field: &str, value: &str) -> String {
    format!("{field} eq '{}'", value.replace('\'', "''"))
}

/// Constant similarity score reported by the in-memory index.
const MOCK_SCORE: f64 = 0.95;

/// Persists (vector, text, metadata) records and answers nearest-neighbor
/// queries. All-or-nothing writes are NOT guaranteed; a backend error may
/// leave a partial batch behind.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotently creates or updates the index schema. Called once at
    /// startup.
    async fn ensure_schema(&self) -> Result<()>;

    /// Writes all records under fresh random identifiers and returns those
    /// identifiers in input order.
    async fn store(&self, records: Vec<VectorRecord>) -> Result<Vec<String>>;

    /// Nearest-neighbor lookup; returns at most `top_k` hits, most similar
    /// first on live backends.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>>;

    /// Deletes every record whose metadata `field` equals `value` and
    /// returns the count removed. On backends without a filtered delete this
    /// is search-then-delete: two steps, not atomic, and concurrent writers
    /// can race it.
    async fn delete_by_field(&self, field: &str, value: &str) -> Result<usize>;

    /// Connectivity/configuration probe for health checks.
    async fn check_ready(&self) -> Result<()>;
}

#[async_trait]
impl<T: VectorIndex + ?Sized> VectorIndex for Box<T> {
    async fn ensure_schema(&self) -> Result<()> {
        (**self).ensure_schema().await
    }

    async fn store(&self, records: Vec<VectorRecord>) -> Result<Vec<String>> {
        (**self).store(records).await
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        (**self).search(vector, top_k).await
    }

    async fn delete_by_field(&self, field: &str, value: &str) -> Result<usize> {
        (**self).delete_by_field(field, value).await
    }

    async fn check_ready(&self) -> Result<()> {
        (**self).check_ready().await
    }
}

/// Azure AI Search adapter speaking the plain REST surface.
pub struct AzureSearchIndex {
    client: Client,
    endpoint: String,
    api_key: String,
    index_name: String,
    dimensions: usize,
}

impl AzureSearchIndex {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        index_name: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            index_name: index_name.into(),
            dimensions,
        }
    }

    fn docs_url(&self, operation: &str) -> String {
        format!(
            "{}/indexes/{}/docs/{}?api-version={}",
            self.endpoint, self.index_name, operation, SEARCH_API_VERSION
        )
    }

    async fn post_actions(&self, actions: Vec<Value>) -> Result<()> {
        let response = self
            .client
            .post(self.docs_url("index"))
            .header("api-key", &self.api_key)
            .json(&json!({ "value": actions }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::store(
                "search-index",
                format!("document batch returned {}", response.status()),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for AzureSearchIndex {
    async fn ensure_schema(&self) -> Result<()> {
        let schema = json!({
            "name": self.index_name,
            "fields": [
                {"name": "id", "type": "Edm.String", "key": true, "filterable": true},
                {"name": "content", "type": "Edm.String", "searchable": true},
                {
                    "name": "embedding",
                    "type": "Collection(Edm.Single)",
                    "searchable": true,
                    "dimensions": self.dimensions,
                    "vectorSearchProfile": "default-profile"
                },
                {"name": "filename", "type": "Edm.String", "filterable": true, "facetable": true},
                {"name": "chunk_id", "type": "Edm.Int32", "filterable": true}
            ],
            "vectorSearch": {
                "profiles": [
                    {"name": "default-profile", "algorithm": "hnsw-config"}
                ],
                "algorithms": [
                    {"name": "hnsw-config", "kind": "hnsw"}
                ]
            }
        });

        let response = self
            .client
            .put(format!(
                "{}/indexes/{}?api-version={}",
                self.endpoint, self.index_name, SEARCH_API_VERSION
            ))
            .header("api-key", &self.api_key)
            .json(&schema)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::store(
                "search-index",
                format!("index setup returned {}", response.status()),
            ));
        }

        info!(index = %self.index_name, "search index ready");
        Ok(())
    }

    async fn store(&self, records: Vec<VectorRecord>) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(records.len());
        let mut actions = Vec::with_capacity(records.len());

        for record in &records {
            if record.embedding.len() != self.dimensions {
                return Err(PipelineError::store(
                    "search-index",
                    format!(
                        "embedding dimension {} does not match index dimension {}",
                        record.embedding.len(),
                        self.dimensions
                    ),
                ));
            }

            let id = Uuid::new_v4().to_string();
            actions.push(json!({
                "@search.action": "mergeOrUpload",
                "id": id,
                "content": record.text,
                "embedding": record.embedding,
                "filename": record.filename,
                "chunk_id": record.chunk_id,
            }));
            ids.push(id);
        }

        if actions.is_empty() {
            return Ok(ids);
        }

        self.post_actions(actions).await?;
        info!(count = ids.len(), "stored vector records");
        Ok(ids)
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if vector.len() != self.dimensions {
            return Err(PipelineError::store(
                "search-index",
                format!(
                    "query vector dimension {} does not match index dimension {}",
                    vector.len(),
                    self.dimensions
                ),
            ));
        }

        let response = self
            .client
            .post(self.docs_url("search"))
            .header("api-key", &self.api_key)
            .json(&json!({
                "select": "content,filename,chunk_id",
                "vectorQueries": [{
                    "kind": "vector",
                    "vector": vector,
                    "fields": "embedding",
                    "k": top_k,
                }],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::store(
                "search-index",
                format!("vector search returned {}", response.status()),
            ));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/value")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::new();
        for hit in hits {
            let text = hit
                .pointer("/content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let score = hit
                .pointer("/@search.score")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let filename = hit
                .pointer("/filename")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let chunk_id = hit
                .pointer("/chunk_id")
                .and_then(Value::as_u64)
                .unwrap_or_default() as u32;

            results.push(SearchHit {
                text,
                score,
                filename,
                chunk_id,
            });
        }

        Ok(results)
    }

    async fn delete_by_field(&self, field: &str, value: &str) -> Result<usize> {
        let filter = odata_eq_filter(field, value);
        let mut total = 0;

        // Page through matches until the filtered search runs dry. Stops on
        // a short page so lagging delete visibility cannot loop forever.
        loop {
            let response = self
                .client
                .post(self.docs_url("search"))
                .header("api-key", &self.api_key)
                .json(&json!({
                    "search": "*",
                    "filter": filter.as_str(),
                    "select": "id",
                    "top": DELETE_PAGE_SIZE,
                }))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(PipelineError::store(
                    "search-index",
                    format!("filtered search returned {}", response.status()),
                ));
            }

            let parsed: Value = response.json().await?;
            let ids: Vec<String> = parsed
                .pointer("/value")
                .and_then(Value::as_array)
                .map(|docs| {
                    docs.iter()
                        .filter_map(|doc| doc.pointer("/id").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            if ids.is_empty() {
                break;
            }

            let actions = ids
                .iter()
                .map(|id| json!({"@search.action": "delete", "id": id}))
                .collect::<Vec<_>>();
            let page = actions.len();
            self.post_actions(actions).await?;
            total += page;

            if page < DELETE_PAGE_SIZE {
                break;
            }
        }

        info!(count = total, field = %field, "deleted vector records");
        Ok(total)
    }

    async fn check_ready(&self) -> Result<()> {
        let response = self
            .client
            .get(self.docs_url("$count"))
            .header("api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::store(
                "search-index",
                format!("document count probe returned {}", response.status()),
            ));
        }

        Ok(())
    }
}

struct StoredRecord {
    id: String,
    record: VectorRecord,
}

/// In-memory stand-in used when no search credentials are configured.
/// Search returns the first `top_k` records in insertion order with a
/// constant score, not similarity order; this divergence from the live
/// backend is deliberate and documented.
#[derive(Default)]
pub struct MemoryVectorIndex {
    records: Mutex<Vec<StoredRecord>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("record list poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn store(&self, records: Vec<VectorRecord>) -> Result<Vec<String>> {
        let mut stored = self.records.lock().expect("record list poisoned");
        let mut ids = Vec::with_capacity(records.len());

        for record in records {
            let id = Uuid::new_v4().to_string();
            stored.push(StoredRecord {
                id: id.clone(),
                record,
            });
            ids.push(id);
        }

        info!(count = ids.len(), "[mock] stored vector records");
        Ok(ids)
    }

    async fn search(&self, _vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        let stored = self.records.lock().expect("record list poisoned");
        Ok(stored
            .iter()
            .take(top_k)
            .map(|entry| SearchHit {
                text: entry.record.text.clone(),
                score: MOCK_SCORE,
                filename: entry.record.filename.clone(),
                chunk_id: entry.record.chunk_id,
            })
            .collect())
    }

    async fn delete_by_field(&self, field: &str, value: &str) -> Result<usize> {
        let mut stored = self.records.lock().expect("record list poisoned");
        let initial = stored.len();

        stored.retain(|entry| match field {
            "filename" => entry.record.filename != value,
            "chunk_id" => entry.record.chunk_id.to_string() != value,
            "id" => entry.id != value,
            _ => true,
        });

        Ok(initial - stored.len())
    }

    async fn check_ready(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odata_filter_doubles_embedded_quotes() {
        assert_eq!(
            odata_eq_filter("filename", "o'brien.pdf"),
            "filename eq 'o''brien.pdf'"
        );
        assert_eq!(
            odata_eq_filter("filename", "report.pdf"),
            "filename eq 'report.pdf'"
        );
    }

    fn record(filename: &str, chunk_id: u32, text: &str) -> VectorRecord {
        VectorRecord {
            embedding: vec![0.1, 0.2, 0.3],
            text: text.to_string(),
            filename: filename.to_string(),
            chunk_id,
        }
    }

    #[tokio::test]
    async fn store_returns_unique_ids_in_input_order() {
        let index = MemoryVectorIndex::new();
        let ids = index
            .store(vec![record("a.pdf", 0, "one"), record("a.pdf", 1, "two")])
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn search_returns_insertion_order_with_constant_score() {
        let index = MemoryVectorIndex::new();
        index
            .store(vec![
                record("a.pdf", 0, "first"),
                record("a.pdf", 1, "second"),
                record("b.pdf", 0, "third"),
            ])
            .await
            .unwrap();

        let hits = index.search(&[0.0; 3], 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "first");
        assert_eq!(hits[1].text, "second");
        assert!(hits.iter().all(|hit| (hit.score - 0.95).abs() < f64::EPSILON));
    }

    #[tokio::test]
    async fn search_on_empty_index_returns_no_hits() {
        let index = MemoryVectorIndex::new();
        let hits = index.search(&[0.0; 3], 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_by_filename_removes_only_matching_records() {
        let index = MemoryVectorIndex::new();
        index
            .store(vec![
                record("a.pdf", 0, "first"),
                record("b.pdf", 0, "second"),
                record("a.pdf", 1, "third"),
            ])
            .await
            .unwrap();

        let removed = index.delete_by_field("filename", "a.pdf").await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(index.len(), 1);
        let remaining = index.search(&[0.0; 3], 5).await.unwrap();
        assert_eq!(remaining[0].filename, "b.pdf");
    }

    #[tokio::test]
    async fn delete_with_unknown_field_removes_nothing() {
        let index = MemoryVectorIndex::new();
        index.store(vec![record("a.pdf", 0, "first")]).await.unwrap();

        let removed = index.delete_by_field("owner", "nobody").await.unwrap();

        assert_eq!(removed, 0);
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn storing_nothing_returns_no_ids() {
        let index = MemoryVectorIndex::new();
        let ids = index.store(Vec::new()).await.unwrap();
        assert!(ids.is_empty());
    }
}
