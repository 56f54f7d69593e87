//! Model loader: turns a manifest source URI into a ready predictor
//!
//! The registry treats loading as opaque and possibly slow; it bounds every
//! call with its own timeout, so loaders only need to report success or failure.

use super::predictor::{ModelArtifact, Predictor};
use crate::manifest::ALIAS_SCHEME;
use crate::store::{ArtifactStore, validate_key};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Scheme for artifacts addressed inside the artifact store
pub const STORE_SCHEME: &str = "store://";

/// Deserializes artifacts into predictors
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, source_uri: &str) -> Result<Arc<dyn Predictor>>;
}

/// Parsed location of an artifact inside the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub bucket: String,
    pub key: String,
}

impl ArtifactLocation {
    /// Parse `store://<bucket>/<key>` or a bare key inside `default_bucket`
    pub fn parse(source_uri: &str, default_bucket: &str) -> Result<Self> {
        if source_uri.starts_with(ALIAS_SCHEME) {
            anyhow::bail!("Unresolved model alias '{}'", source_uri);
        }

        let (bucket, key) = match source_uri.strip_prefix(STORE_SCHEME) {
            Some(rest) => rest
                .split_once('/')
                .with_context(|| format!("Source URI '{}' has no object key", source_uri))?,
            None if source_uri.contains(":/") => {
                anyhow::bail!("Unsupported source URI scheme: '{}'", source_uri)
            }
            None => (default_bucket, source_uri),
        };

        if bucket.is_empty() {
            anyhow::bail!("Source URI '{}' has no bucket", source_uri);
        }
        validate_key(key)?;

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    pub fn to_uri(&self) -> String {
        format!("{}{}/{}", STORE_SCHEME, self.bucket, self.key)
    }
}

/// Loads JSON model artifacts from the artifact store
pub struct StoreModelLoader {
    store: Arc<dyn ArtifactStore>,
    default_bucket: String,
}

impl StoreModelLoader {
    pub fn new(store: Arc<dyn ArtifactStore>, default_bucket: impl Into<String>) -> Self {
        Self {
            store,
            default_bucket: default_bucket.into(),
        }
    }
}

#[async_trait]
impl ModelLoader for StoreModelLoader {
    async fn load(&self, source_uri: &str) -> Result<Arc<dyn Predictor>> {
        let location = ArtifactLocation::parse(source_uri, &self.default_bucket)?;

        tracing::debug!(
            bucket = %location.bucket,
            key = %location.key,
            "Fetching model artifact"
        );

        let body = self
            .store
            .get(&location.bucket, &location.key)
            .await
            .with_context(|| format!("Failed to fetch artifact {}", location.to_uri()))?
            .with_context(|| format!("Artifact {} not found", location.to_uri()))?;

        let artifact = ModelArtifact::from_json(&body)
            .with_context(|| format!("Failed to deserialize artifact {}", location.to_uri()))?;

        Ok(artifact.into_predictor())
    }
}
