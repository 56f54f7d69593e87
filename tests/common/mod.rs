//! Shared fakes for registry and API tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use model_swap::{
    ArtifactStore, Manifest, ManifestEntry, ManifestLocation, ManualClock, MemoryStore,
    ModelLoader, ModelRegistry, Predictor, RegistryPolicy, models::LinearModel,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const BUCKET: &str = "models";
pub const MANIFEST_KEY: &str = "manifests/model_list.json";

/// Memory store with fetch counting, failure and latency injection
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    gets: AtomicUsize,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Write a raw manifest document
    pub async fn put_manifest(&self, body: &[u8]) {
        self.inner.put(BUCKET, MANIFEST_KEY, body).await.unwrap();
    }
}

#[async_trait]
impl ArtifactStore for FlakyStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("store unreachable");
        }
        self.inner.get(bucket, key).await
    }

    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()> {
        self.inner.put(bucket, key, body).await
    }
}

/// Loader that builds `y = intercept + sum(x)` predictors keyed by source URI
#[derive(Default)]
pub struct FakeLoader {
    calls: AtomicUsize,
    intercepts: Mutex<HashMap<String, f64>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_intercept(&self, source_uri: &str, intercept: f64) {
        self.intercepts
            .lock()
            .insert(source_uri.to_string(), intercept);
    }

    pub fn fail_on(&self, source_uri: &str) {
        self.failing.lock().insert(source_uri.to_string());
    }

    pub fn heal(&self, source_uri: &str) {
        self.failing.lock().remove(source_uri);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl ModelLoader for FakeLoader {
    async fn load(&self, source_uri: &str) -> Result<Arc<dyn Predictor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(source_uri) {
            anyhow::bail!("cannot deserialize {}", source_uri);
        }

        let intercept = self
            .intercepts
            .lock()
            .get(source_uri)
            .copied()
            .unwrap_or(0.0);
        Ok(Arc::new(LinearModel::new(vec![1.0, 1.0, 1.0], intercept)))
    }
}

/// Source URI used for a model version in test manifests
pub fn source_uri(name: &str, version: &str) -> String {
    format!("{}/v{}/model.json", name, version)
}

pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub loader: Arc<FakeLoader>,
    pub clock: Arc<ManualClock>,
    pub registry: Arc<ModelRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(RegistryPolicy::default())
    }

    pub fn with_policy(policy: RegistryPolicy) -> Self {
        let store = FlakyStore::new();
        let loader = FakeLoader::new();
        let clock = Arc::new(ManualClock::new());
        let registry = Arc::new(
            ModelRegistry::new(
                store.clone(),
                loader.clone(),
                ManifestLocation::new(BUCKET, MANIFEST_KEY),
                policy,
            )
            .with_clock(clock.clone()),
        );

        Self {
            store,
            loader,
            clock,
            registry,
        }
    }

    /// Overwrite the manifest with `(name, version)` rows
    pub async fn set_manifest(&self, models: &[(&str, &str)]) {
        let manifest: Manifest = models
            .iter()
            .map(|(name, version)| {
                ManifestEntry::new(*name, source_uri(name, version), *version)
                    .with_date("20250830")
            })
            .collect();

        self.store
            .put(
                BUCKET,
                MANIFEST_KEY,
                manifest.to_json_pretty().unwrap().as_bytes(),
            )
            .await
            .unwrap();
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }
}
