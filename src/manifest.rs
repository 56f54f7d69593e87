//! Manifest document: model name to artifact location and version token
//!
//! The document is a JSON object keyed by model name:
//!
//! ```json
//! {
//!   "iris_model": {
//!     "path": "store://models/models/iris_model/v2/model.json",
//!     "version": "2",
//!     "date": "20250830",
//!     "model_relative_uri": "models:/iris_model/2"
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Prefix of registry-relative model aliases
pub const ALIAS_SCHEME: &str = "models:/";

/// Where the manifest document lives in the artifact store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLocation {
    pub bucket: String,
    pub key: String,
}

impl ManifestLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ManifestLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// One model row of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Model name; the document key, not serialized inside the row
    #[serde(skip)]
    pub name: String,

    /// Locator understood by the model loader
    #[serde(rename = "path")]
    pub source_uri: String,

    /// Opaque version token; equality means unchanged
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,

    /// Registration date, informational only
    #[serde(rename = "date", default, skip_serializing_if = "Option::is_none")]
    pub registered_date: Option<String>,

    #[serde(
        default,
        alias = "modelRelativeURI",
        skip_serializing_if = "Option::is_none"
    )]
    pub model_relative_uri: Option<String>,
}

impl ManifestEntry {
    pub fn new(
        name: impl Into<String>,
        source_uri: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_uri: source_uri.into(),
            version: version.into(),
            registered_date: None,
            model_relative_uri: None,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.registered_date = Some(date.into());
        self
    }

    pub fn with_relative_uri(mut self, uri: impl Into<String>) -> Self {
        self.model_relative_uri = Some(uri.into());
        self
    }

    pub fn is_alias(&self) -> bool {
        self.source_uri.starts_with(ALIAS_SCHEME)
    }
}

/// Version tokens come from registries that emit either strings or integers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Token {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Token::deserialize(deserializer)? {
        Token::Str(s) => s,
        Token::Int(n) => n.to_string(),
        Token::Float(f) => f.to_string(),
    })
}

/// Name-keyed set of manifest entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a manifest document, filling entry names and resolving aliases
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut manifest: Manifest =
            serde_json::from_slice(bytes).context("Malformed manifest document")?;

        for (name, entry) in manifest.entries.iter_mut() {
            entry.name = name.clone();
            if entry.version.is_empty() {
                anyhow::bail!("Manifest entry '{}' has an empty version", name);
            }
            if entry.source_uri.is_empty() {
                anyhow::bail!("Manifest entry '{}' has an empty path", name);
            }
        }

        manifest.resolve_aliases();
        Ok(manifest)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize manifest")
    }

    /// Rewrite `models:/<name>/<version>` paths to the artifact path of the entry
    /// registered under that relative URI. Unresolvable aliases are left as-is.
    pub fn resolve_aliases(&mut self) {
        let targets: BTreeMap<String, String> = self
            .entries
            .values()
            .filter(|e| !e.is_alias())
            .filter_map(|e| {
                e.model_relative_uri
                    .as_ref()
                    .map(|uri| (uri.clone(), e.source_uri.clone()))
            })
            .collect();

        for entry in self.entries.values_mut() {
            if !entry.is_alias() {
                continue;
            }
            if let Some(path) = targets.get(&entry.source_uri) {
                tracing::debug!(
                    model = %entry.name,
                    alias = %entry.source_uri,
                    path = %path,
                    "Resolved manifest alias"
                );
                entry.source_uri = path.clone();
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(name)
    }

    /// Insert or replace an entry, returning the previous one
    pub fn upsert(&mut self, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(entry.name.clone(), entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compare against a newer manifest
    pub fn diff(&self, newer: &Manifest) -> ManifestDiff {
        let mut diff = ManifestDiff::default();

        for (name, entry) in &newer.entries {
            match self.entries.get(name) {
                Some(old) if old.version != entry.version => diff.changed.push(name.clone()),
                Some(_) => {}
                None => diff.added.push(name.clone()),
            }
        }

        diff.removed = self
            .entries
            .keys()
            .filter(|name| !newer.entries.contains_key(*name))
            .cloned()
            .collect();

        diff
    }
}

impl FromIterator<ManifestEntry> for Manifest {
    fn from_iter<I: IntoIterator<Item = ManifestEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }
}

/// Name-level changes between two manifests, each list sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestDiff {
    /// Present in both with a different version token
    pub changed: Vec<String>,
    /// Only in the newer manifest
    pub added: Vec<String>,
    /// Only in the older manifest
    pub removed: Vec<String>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}
