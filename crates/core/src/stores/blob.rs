use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::info;

/// Durable storage for raw uploaded bytes. Uploads overwrite silently; there
/// is no versioning and no partial-upload recovery.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores the blob and returns its retrieval URL.
    async fn upload(&self, filename: &str, content: &[u8]) -> Result<String>;

    async fn delete(&self, filename: &str) -> Result<()>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    async fn upload(&self, filename: &str, content: &[u8]) -> Result<String> {
        (**self).upload(filename, content).await
    }

    async fn delete(&self, filename: &str) -> Result<()> {
        (**self).delete(filename).await
    }
}

/// Azure Blob Storage adapter authenticating with a SAS token appended to
/// the request URL.
pub struct AzureBlobStore {
    client: Client,
    account_url: String,
    container: String,
    sas_token: Option<String>,
}

impl AzureBlobStore {
    pub fn new(
        account_url: impl Into<String>,
        container: impl Into<String>,
        sas_token: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            account_url: account_url.into(),
            container: container.into(),
            sas_token,
        }
    }

    fn blob_url(&self, filename: &str) -> String {
        format!("{}/{}/{}", self.account_url, self.container, filename)
    }

    fn request_url(&self, filename: &str) -> String {
        match &self.sas_token {
            Some(token) => format!("{}?{}", self.blob_url(filename), token),
            None => self.blob_url(filename),
        }
    }
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    async fn upload(&self, filename: &str, content: &[u8]) -> Result<String> {
        let response = self
            .client
            .put(self.request_url(filename))
            .header("x-ms-blob-type", "BlockBlob")
            .header("content-type", "application/pdf")
            .body(content.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::store(
                "blob",
                format!("upload of {filename} returned {}", response.status()),
            ));
        }

        Ok(self.blob_url(filename))
    }

    async fn delete(&self, filename: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.request_url(filename))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::store(
                "blob",
                format!("delete of {filename} returned {}", response.status()),
            ));
        }

        Ok(())
    }
}

/// In-memory stand-in used when no storage credentials are configured.
/// Returns a synthetic URL and performs no I/O; uploaded names are tracked
/// so deletes stay observable in tests.
pub struct MemoryBlobStore {
    container: String,
    blobs: Mutex<HashSet<String>>,
}

impl MemoryBlobStore {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            blobs: Mutex::new(HashSet::new()),
        }
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.blobs.lock().expect("blob set poisoned").contains(filename)
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("pdf-documents")
    }
}

#[async_trait]
impl ObjectStore for MemoryBlobStore {
    async fn upload(&self, filename: &str, _content: &[u8]) -> Result<String> {
        self.blobs
            .lock()
            .expect("blob set poisoned")
            .insert(filename.to_string());
        info!(filename = %filename, "[mock] uploaded blob");
        Ok(format!(
            "https://mockaccount.blob.core.windows.net/{}/{}",
            self.container, filename
        ))
    }

    async fn delete(&self, filename: &str) -> Result<()> {
        self.blobs
            .lock()
            .expect("blob set poisoned")
            .remove(filename);
        info!(filename = %filename, "[mock] deleted blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_upload_returns_synthetic_url_and_tracks_name() {
        let store = MemoryBlobStore::default();

        let url = store.upload("report.pdf", b"%PDF-1.4").await.unwrap();

        assert_eq!(
            url,
            "https://mockaccount.blob.core.windows.net/pdf-documents/report.pdf"
        );
        assert!(store.contains("report.pdf"));
    }

    #[tokio::test]
    async fn mock_delete_removes_tracked_name() {
        let store = MemoryBlobStore::default();
        store.upload("report.pdf", b"%PDF-1.4").await.unwrap();

        store.delete("report.pdf").await.unwrap();

        assert!(!store.contains("report.pdf"));
    }

    #[tokio::test]
    async fn mock_upload_overwrites_silently() {
        let store = MemoryBlobStore::default();
        let first = store.upload("report.pdf", b"one").await.unwrap();
        let second = store.upload("report.pdf", b"two").await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn live_store_builds_container_scoped_urls() {
        let store = AzureBlobStore::new(
            "https://acct.blob.core.windows.net",
            "pdf-documents",
            Some("sv=2024&sig=abc".to_string()),
        );

        assert_eq!(
            store.blob_url("report.pdf"),
            "https://acct.blob.core.windows.net/pdf-documents/report.pdf"
        );
        assert_eq!(
            store.request_url("report.pdf"),
            "https://acct.blob.core.windows.net/pdf-documents/report.pdf?sv=2024&sig=abc"
        );
    }
}
