//! Object storage boundary: uploads of source videos and public URLs of
//! produced archives.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key`; returns the stored key.
    async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// Downloadable URL of an object.
    fn public_url(&self, key: &str) -> String;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),
    #[error("object storage unavailable: {0}")]
    Unavailable(String),
}

/// S3-style bucket addressing.
///
/// Resolves public URLs only. Uploads go through the HTTP layer, so
/// `put_object` always fails with [`StorageError::Unavailable`].
#[derive(Debug, Clone)]
pub struct S3UrlStorage {
    bucket: String,
    region: String,
}

impl S3UrlStorage {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3UrlStorage {
    async fn put_object(&self, key: &str, _bytes: &[u8]) -> Result<String, StorageError> {
        Err(StorageError::Unavailable(format!(
            "uploads to {} are handled by the HTTP layer (key {key:?})",
            self.bucket
        )))
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket,
            self.region,
            key.trim_start_matches('/')
        )
    }
}

/// In-memory object storage for tests/dev.
#[derive(Debug)]
pub struct InMemoryObjectStorage {
    base_url: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
    unavailable: bool,
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self {
            base_url: "memory://objects".to_string(),
            objects: RwLock::new(HashMap::new()),
            unavailable: false,
        }
    }

    /// Serve public URLs under `base_url` instead of `memory://objects`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Storage whose uploads always fail.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new()
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable("in-memory storage disabled".to_string()));
        }
        if key.trim().is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StorageError::Unavailable("lock poisoned".to_string()))?;
        objects.insert(key.to_string(), bytes.to_vec());
        Ok(key.to_string())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}
