//! Publishing: copy a model artifact into the store and point the manifest at it
//!
//! Writing the artifact first and the manifest second means a registry never sees
//! a manifest entry whose artifact is missing.

use crate::manifest::{ALIAS_SCHEME, Manifest, ManifestEntry, ManifestLocation};
use crate::models::{ArtifactLocation, ModelArtifact};
use crate::store::ArtifactStore;
use anyhow::{Context, Result};

/// What to publish
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub model_name: String,
    /// Serialized artifact document
    pub artifact: Vec<u8>,
    /// Explicit version; defaults to the previous numeric version plus one
    pub version: Option<String>,
}

/// Result of a publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub entry: ManifestEntry,
    pub previous_version: Option<String>,
}

/// Key under which an artifact version is stored
pub fn artifact_key(model_name: &str, version: &str) -> String {
    format!("models/{}/v{}/model.json", model_name, version)
}

/// Next version after `previous`; numeric tokens increment, anything else restarts at 1
pub fn next_version(previous: Option<&str>) -> Result<String> {
    match previous.and_then(|v| v.parse::<u64>().ok()) {
        Some(n) => n
            .checked_add(1)
            .map(|next| next.to_string())
            .with_context(|| format!("Version {} cannot be incremented", n)),
        None => Ok("1".to_string()),
    }
}

/// Write an artifact and upsert its manifest entry
pub async fn publish_model(
    store: &dyn ArtifactStore,
    location: &ManifestLocation,
    request: PublishRequest,
) -> Result<Published> {
    if request.model_name.is_empty() || request.model_name.contains('/') {
        anyhow::bail!("Invalid model name '{}'", request.model_name);
    }

    ModelArtifact::from_json(&request.artifact).context("Artifact failed validation")?;

    let mut manifest = match store.get(&location.bucket, &location.key).await? {
        Some(body) => Manifest::parse(&body)
            .with_context(|| format!("Existing manifest {} is malformed", location))?,
        None => {
            tracing::info!(manifest = %location, "No manifest found, creating a new one");
            Manifest::new()
        }
    };

    let previous_version = manifest
        .get(&request.model_name)
        .map(|entry| entry.version.clone());
    let version = match request.version.clone() {
        Some(version) => version,
        None => next_version(previous_version.as_deref())?,
    };

    if previous_version.as_deref() == Some(version.as_str()) {
        anyhow::bail!(
            "Model '{}' is already published at version {}",
            request.model_name,
            version
        );
    }

    let artifact_location = ArtifactLocation {
        bucket: location.bucket.clone(),
        key: artifact_key(&request.model_name, &version),
    };
    store
        .put(
            &artifact_location.bucket,
            &artifact_location.key,
            &request.artifact,
        )
        .await
        .with_context(|| format!("Failed to write artifact {}", artifact_location.to_uri()))?;

    let entry = ManifestEntry::new(&request.model_name, artifact_location.to_uri(), &version)
        .with_date(chrono::Utc::now().format("%Y%m%d").to_string())
        .with_relative_uri(format!("{}{}/{}", ALIAS_SCHEME, request.model_name, version));
    manifest.upsert(entry.clone());

    store
        .put(
            &location.bucket,
            &location.key,
            manifest.to_json_pretty()?.as_bytes(),
        )
        .await
        .with_context(|| format!("Failed to write manifest {}", location))?;

    tracing::info!(
        model = %request.model_name,
        version = %version,
        previous_version = ?previous_version,
        path = %entry.source_uri,
        "Model published"
    );

    Ok(Published {
        entry,
        previous_version,
    })
}
