//! Artifact store backends holding the manifest document and model blobs

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

// ============================================================================
// Trait Definitions
// ============================================================================

/// Blob storage addressed by bucket and key
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch an object
    /// Returns None if the object doesn't exist
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store an object, replacing any previous content atomically
    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()>;
}

/// Reject keys that would escape the bucket directory
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        anyhow::bail!("Object key cannot be empty");
    }

    let path = Path::new(key);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => anyhow::bail!("Object key '{}' must be a relative path without '..'", key),
        }
    }

    Ok(())
}

// ============================================================================
// Filesystem Implementation
// ============================================================================

/// Bucket layout on local disk: `<root>/<bucket>/<key>`
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_key(bucket).context("Invalid bucket name")?;
        validate_key(key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ArtifactStore for FileSystemStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(bucket, key)?;

        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read object: {:?}", path)),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        // Atomic write: write to temp file, then rename
        let temp_file = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_file)
            .await
            .context("Failed to create temp object file")?;
        file.write_all(body)
            .await
            .context("Failed to write object file")?;
        file.sync_all().await.context("Failed to sync object file")?;

        fs::rename(&temp_file, &path)
            .await
            .context("Failed to rename temp object file")?;

        tracing::debug!(bucket = %bucket, key = %key, bytes = body.len(), "Object written");

        Ok(())
    }
}

// ============================================================================
// In-memory Implementation
// ============================================================================

/// Process-local store, used for tests and embedded setups
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Remove an object, returning whether it existed
    pub fn remove(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .write()
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.objects
            .write()
            .insert((bucket.to_string(), key.to_string()), body.to_vec());
        Ok(())
    }
}
