//! Certificate document storage
//!
//! A document store accepts bytes under a filename and hands back an opaque
//! reference that later retrieves them.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{AppError, AppResult};

/// Opaque byte store for rendered certificates
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `bytes` under `filename`, returning a retrievable reference
    async fn put(&self, filename: &str, bytes: &[u8]) -> AppResult<String>;

    async fn get(&self, reference: &str) -> AppResult<Vec<u8>>;

    async fn delete(&self, reference: &str) -> AppResult<()>;
}

/// Build the store selected in configuration
pub fn document_store_from_config(config: &StorageConfig) -> AppResult<Arc<dyn DocumentStore>> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalDocumentStore::new(&config.local_dir))),
        StorageBackend::Http => {
            if config.http_base_url.trim().is_empty() {
                return Err(AppError::Configuration(
                    "storage.http_base_url is required for the http backend".to_string(),
                ));
            }
            Ok(Arc::new(HttpDocumentStore::new(
                config.http_base_url.clone(),
                config.http_api_key.clone(),
            )?))
        }
    }
}

fn check_filename(filename: &str) -> AppResult<()> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(AppError::StorageError(format!(
            "Invalid document filename: {}",
            filename
        ))),
    }
}

// ============================================================================
// Local filesystem
// ============================================================================

/// Keeps documents as files under one directory; references are file paths
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a reference, refusing anything outside the root directory
    fn resolve(&self, reference: &str) -> AppResult<PathBuf> {
        let path = PathBuf::from(reference);
        let name = path
            .strip_prefix(&self.root)
            .ok()
            .and_then(|rest| rest.to_str())
            .ok_or_else(|| AppError::NotFound("Document".to_string()))?;
        check_filename(name).map_err(|_| AppError::NotFound("Document".to_string()))?;
        Ok(path)
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn put(&self, filename: &str, bytes: &[u8]) -> AppResult<String> {
        check_filename(filename)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::StorageError(format!("Cannot create directory: {}", e)))?;

        let path = self.root.join(filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::StorageError(format!("Cannot write document: {}", e)))?;

        path.to_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::StorageError("Non UTF-8 document path".to_string()))
    }

    async fn get(&self, reference: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound("Document".to_string()))
            }
            Err(e) => Err(AppError::StorageError(format!("Cannot read document: {}", e))),
        }
    }

    async fn delete(&self, reference: &str) -> AppResult<()> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::StorageError(format!(
                "Cannot delete document: {}",
                e
            ))),
        }
    }
}

// ============================================================================
// HTTP document service
// ============================================================================

/// Client for a remote document service
#[derive(Clone)]
pub struct HttpDocumentStore {
    base_url: String,
    api_key: String,
    http_client: Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

impl HttpDocumentStore {
    pub fn new(base_url: String, api_key: String) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http_client,
        })
    }

    async fn error_from(response: reqwest::Response) -> AppError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        AppError::StorageError(format!("Document service returned {}: {}", status, body))
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn put(&self, filename: &str, bytes: &[u8]) -> AppResult<String> {
        check_filename(filename)?;

        let response = self
            .http_client
            .put(format!("{}/documents/{}", self.base_url, filename))
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/pdf")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("Upload failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::StorageError(format!("Invalid upload response: {}", e)))?;

        Ok(upload.url)
    }

    async fn get(&self, reference: &str) -> AppResult<Vec<u8>> {
        let response = self
            .http_client
            .get(reference)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("Download failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound("Document".to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::StorageError(format!("Download failed: {}", e)))?;

        Ok(bytes.to_vec())
    }

    async fn delete(&self, reference: &str) -> AppResult<()> {
        let response = self
            .http_client
            .delete(reference)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("Delete failed: {}", e)))?;

        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Keeps documents in process memory; references look like `memory://<name>`
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryDocumentStore {
    const SCHEME: &'static str = "memory://";

    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, filename: &str, bytes: &[u8]) -> AppResult<String> {
        check_filename(filename)?;
        let reference = format!("{}{}", Self::SCHEME, filename);
        self.documents
            .write()
            .await
            .insert(reference.clone(), bytes.to_vec());
        Ok(reference)
    }

    async fn get(&self, reference: &str) -> AppResult<Vec<u8>> {
        self.documents
            .read()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Document".to_string()))
    }

    async fn delete(&self, reference: &str) -> AppResult<()> {
        self.documents.write().await.remove(reference);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_must_be_a_single_component() {
        assert!(check_filename("ORG-2026-X.pdf").is_ok());
        assert!(check_filename("../etc/passwd").is_err());
        assert!(check_filename("a/b.pdf").is_err());
        assert!(check_filename("/abs.pdf").is_err());
        assert!(check_filename("").is_err());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_delete() {
        let store = MemoryDocumentStore::new();
        let reference = store.put("c.pdf", b"%PDF").await.unwrap();
        assert_eq!(reference, "memory://c.pdf");
        assert_eq!(store.get(&reference).await.unwrap(), b"%PDF");

        store.delete(&reference).await.unwrap();
        assert!(matches!(
            store.get(&reference).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_store_writes_under_root() {
        let root = std::env::temp_dir().join(format!("oc-docs-{}", uuid::Uuid::new_v4()));
        let store = LocalDocumentStore::new(&root);

        let reference = store.put("c.pdf", b"%PDF-1.4").await.unwrap();
        assert!(PathBuf::from(&reference).starts_with(&root));
        assert_eq!(store.get(&reference).await.unwrap(), b"%PDF-1.4");

        // References outside the root are never read
        assert!(matches!(
            store.get("/etc/hostname").await,
            Err(AppError::NotFound(_))
        ));

        store.delete(&reference).await.unwrap();
        assert!(store.get(&reference).await.is_err());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_http_backend_requires_base_url() {
        let config = StorageConfig {
            backend: StorageBackend::Http,
            local_dir: String::new(),
            http_base_url: String::new(),
            http_api_key: String::new(),
        };
        assert!(matches!(
            document_store_from_config(&config),
            Err(AppError::Configuration(_))
        ));
    }
}
