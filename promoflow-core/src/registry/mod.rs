//! Model registry: object store capability and its implementations.

pub mod pusher;

pub use pusher::ModelPusher;

use crate::error::PipelineError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;

/// Bucket-scoped object store holding production model binaries.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, PipelineError>;

    /// Fetch an object. A missing key is [`PipelineError::NotFound`].
    async fn load(&self, key: &str) -> Result<Vec<u8>, PipelineError>;

    /// Upload the file at `local_path` under `key`, replacing any previous object.
    async fn save(&self, key: &str, local_path: &Path) -> Result<(), PipelineError>;

    fn bucket(&self) -> &str;
}

/// Reject keys that could escape the bucket.
pub fn validate_key(key: &str) -> Result<(), PipelineError> {
    if key.trim().is_empty() {
        return Err(PipelineError::config("registry key must not be empty"));
    }
    if key.contains('\\') {
        return Err(PipelineError::config(format!(
            "registry key '{key}' must use '/' separators"
        )));
    }
    let path = Path::new(key);
    if path.is_absolute()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(PipelineError::config(format!(
            "registry key '{key}' must be a relative path without '.' or '..'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// LocalObjectStore
// ---------------------------------------------------------------------------

/// Directory-backed store: objects live at `<root>/<bucket>/<key>`.
pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Result<Self, PipelineError> {
        let bucket = bucket.into();
        validate_key(&bucket)?;
        Ok(Self {
            root: root.into(),
            bucket,
        })
    }

    pub fn object_path(&self, key: &str) -> Result<PathBuf, PipelineError> {
        validate_key(key)?;
        Ok(self.root.join(&self.bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        let path = self.object_path(key)?;
        tokio::fs::try_exists(&path).await.map_err(|e| {
            PipelineError::registry(format!("failed to stat {}: {e}", path.display()))
        })
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PipelineError::not_found(
                format!("registry object {}/{key}", self.bucket),
            )),
            Err(e) => Err(PipelineError::registry(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn save(&self, key: &str, local_path: &Path) -> Result<(), PipelineError> {
        let target = self.object_path(key)?;
        let bytes = tokio::fs::read(local_path).await?;
        tokio::task::spawn_blocking(move || crate::persistence::atomic_write(&target, &bytes))
            .await
            .map_err(|e| PipelineError::registry(format!("upload task failed: {e}")))?
            .map_err(|e| PipelineError::registry(format!("failed to write object {key}: {e}")))
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

// ---------------------------------------------------------------------------
// InMemoryObjectStore
// ---------------------------------------------------------------------------

/// Store for tests and dry runs. Can simulate outages.
#[derive(Default)]
pub struct InMemoryObjectStore {
    bucket: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
    transient_failures: AtomicU32,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    pub async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PipelineError> {
        validate_key(key)?;
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Every call fails with a retryable error while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The next `n` calls fail with a retryable error.
    pub fn fail_next(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), PipelineError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::registry(format!(
                "bucket {} is unreachable",
                self.bucket
            )));
        }
        let consumed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(PipelineError::registry(format!(
                "bucket {} temporarily unavailable",
                self.bucket
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        self.check_available()?;
        validate_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        self.check_available()?;
        validate_key(key)?;
        self.objects.read().await.get(key).cloned().ok_or_else(|| {
            PipelineError::not_found(format!("registry object {}/{key}", self.bucket))
        })
    }

    async fn save(&self, key: &str, local_path: &Path) -> Result<(), PipelineError> {
        self.check_available()?;
        let bytes = tokio::fs::read(local_path).await?;
        self.put(key, bytes).await
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(validate_key("model-registry").is_ok());
        assert!(validate_key("slots/prod/model.json").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key("a/../../b").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("./model").is_err());
        assert!(validate_key("a\\b").is_err());
    }

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path().join("registry"), "models").unwrap();
        let local = dir.path().join("model.json");
        std::fs::write(&local, b"v1").unwrap();

        assert!(!store.exists("prod").await.unwrap());
        assert!(matches!(
            store.load("prod").await,
            Err(PipelineError::NotFound(_))
        ));

        store.save("prod", &local).await.unwrap();
        assert!(store.exists("prod").await.unwrap());
        assert_eq!(store.load("prod").await.unwrap(), b"v1");
        assert!(dir.path().join("registry/models/prod").exists());

        std::fs::write(&local, b"v2").unwrap();
        store.save("prod", &local).await.unwrap();
        assert_eq!(store.load("prod").await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_local_store_rejects_escaping_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path(), "models").unwrap();
        assert!(store.exists("../outside").await.is_err());
        assert!(LocalObjectStore::new(dir.path(), "..").is_err());
    }

    #[tokio::test]
    async fn test_in_memory_outage_is_retryable() {
        let store = InMemoryObjectStore::new("models");
        store.put("prod", b"bytes".to_vec()).await.unwrap();
        store.set_unavailable(true);
        let err = store.exists("prod").await.unwrap_err();
        assert!(err.is_retryable());
        store.set_unavailable(false);
        assert!(store.exists("prod").await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_transient_failures_are_consumed() {
        let store = InMemoryObjectStore::new("models");
        store.fail_next(2);
        assert!(store.exists("prod").await.is_err());
        assert!(store.exists("prod").await.is_err());
        assert!(!store.exists("prod").await.unwrap());
    }
}
