//! Model registry: manifest cache, lazy loading and zero-downtime swaps
//!
//! Each model name owns a slot holding the latest manifest entry (the target)
//! and the published predictor state. Predictors are swapped by replacing an
//! immutable [`SlotState`] through `ArcSwap`, so a request that resolved a
//! model keeps that exact predictor and version until it drops the handle.
//!
//! Manifest staleness is checked on a cheap timestamp comparison; predictor
//! reloads are deferred to the next `resolve` of that name and serialized per
//! slot so at most one load per name is in flight.

use super::loader::ModelLoader;
use super::predictor::{PredictError, Predictor};
use crate::clock::{Clock, SystemClock};
use crate::error::{ServeError, ServeResult};
use crate::manifest::{Manifest, ManifestDiff, ManifestEntry, ManifestLocation};
use crate::metrics;
use crate::store::ArtifactStore;
use anyhow::Context;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OnceCell, RwLock};
use tokio::time::timeout;

/// Timing policy for refresh, loading and eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryPolicy {
    /// Minimum time between manifest re-fetches
    pub refresh_interval: Duration,
    /// Bound on a single manifest fetch
    pub fetch_timeout: Duration,
    /// Bound on a single model load
    pub load_timeout: Duration,
    /// Suppress reloading a version that just failed for this long
    pub load_retry_backoff: Duration,
    /// How long a retired model stays resolvable after its last use
    pub eviction_grace: Duration,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            load_timeout: Duration::from_secs(30),
            load_retry_backoff: Duration::from_secs(5),
            eviction_grace: Duration::from_secs(60),
        }
    }
}

/// A predictor bound to the manifest version it was loaded from
#[derive(Debug)]
pub struct LoadedModel {
    pub name: String,
    pub version: String,
    pub source_uri: String,
    pub predictor: Arc<dyn Predictor>,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedModel {
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, PredictError> {
        self.predictor.predict(rows)
    }
}

/// Published state of a slot
#[derive(Debug, Clone)]
pub enum SlotState {
    Unloaded,
    /// A load is in flight; `previous` keeps serving until it completes
    Loading { previous: Option<Arc<LoadedModel>> },
    Ready(Arc<LoadedModel>),
}

impl SlotState {
    /// The predictor requests should be served from right now
    pub fn current(&self) -> Option<&Arc<LoadedModel>> {
        match self {
            SlotState::Unloaded => None,
            SlotState::Loading { previous } => previous.as_ref(),
            SlotState::Ready(model) => Some(model),
        }
    }

    pub fn status(&self) -> ModelStatus {
        match self {
            SlotState::Unloaded => ModelStatus::Unloaded,
            SlotState::Loading { .. } => ModelStatus::Loading,
            SlotState::Ready(_) => ModelStatus::Ready,
        }
    }
}

/// Status of a model in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Known from the manifest, never loaded (or first load failed)
    Unloaded,
    /// Load in progress
    Loading,
    /// A predictor is published
    Ready,
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Snapshot of a slot for introspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub status: ModelStatus,
    /// Version of the predictor currently served
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_version: Option<String>,
    /// Version the manifest currently names
    pub manifest_version: String,
    pub source_uri: String,
    /// Served predictor is behind the manifest
    pub stale: bool,
    /// Name no longer present in the manifest
    pub retired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
struct LoadFailure {
    version: String,
    at: Instant,
    message: String,
}

/// Per-name runtime state
struct ModelSlot {
    name: String,
    target: ArcSwap<ManifestEntry>,
    state: ArcSwap<SlotState>,
    /// Serializes load-and-publish for this name
    load_lock: AsyncMutex<()>,
    last_resolved: Mutex<Option<Instant>>,
    retired_at: Mutex<Option<Instant>>,
    last_failure: Mutex<Option<LoadFailure>>,
}

impl ModelSlot {
    fn new(entry: ManifestEntry) -> Self {
        Self {
            name: entry.name.clone(),
            target: ArcSwap::from_pointee(entry),
            state: ArcSwap::from_pointee(SlotState::Unloaded),
            load_lock: AsyncMutex::new(()),
            last_resolved: Mutex::new(None),
            retired_at: Mutex::new(None),
            last_failure: Mutex::new(None),
        }
    }

    fn current(&self) -> Option<Arc<LoadedModel>> {
        self.state.load().current().cloned()
    }

    /// Current predictor if it matches the manifest target
    fn fresh(&self) -> Option<Arc<LoadedModel>> {
        let target = self.target.load();
        self.current().filter(|model| model.version == target.version)
    }

    /// A failure for `version` that this caller should adopt instead of reloading:
    /// one that happened while it waited, or one still inside the backoff window
    fn recent_failure(
        &self,
        version: &str,
        requested_at: Instant,
        now: Instant,
        backoff: Duration,
    ) -> Option<ServeError> {
        let failure = self.last_failure.lock();
        let failure = failure.as_ref().filter(|f| f.version == version)?;

        let shared = failure.at >= requested_at;
        let backing_off = now.saturating_duration_since(failure.at) < backoff;

        (shared || backing_off).then(|| ServeError::ModelLoad {
            name: self.name.clone(),
            version: failure.version.clone(),
            message: failure.message.clone(),
        })
    }

    fn eviction_due(&self, now: Instant, grace: Duration) -> bool {
        let Some(retired_at) = *self.retired_at.lock() else {
            return false;
        };
        let idle = match *self.last_resolved.lock() {
            Some(last) => now.saturating_duration_since(last) >= grace,
            None => true,
        };
        idle && now.saturating_duration_since(retired_at) >= grace
    }

    async fn load_and_publish(
        &self,
        loader: &dyn ModelLoader,
        target: &ManifestEntry,
        load_timeout: Duration,
        clock: &dyn Clock,
    ) -> ServeResult<Arc<LoadedModel>> {
        let previous = self.current();
        self.state.store(Arc::new(SlotState::Loading {
            previous: previous.clone(),
        }));

        tracing::info!(
            model = %self.name,
            version = %target.version,
            source_uri = %target.source_uri,
            "Loading model"
        );

        let started = Instant::now();
        let result = match timeout(load_timeout, loader.load(&target.source_uri)).await {
            Ok(Ok(predictor)) => Ok(predictor),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(format!("load timed out after {}s", load_timeout.as_secs_f64())),
        };

        match result {
            Ok(predictor) => {
                let model = Arc::new(LoadedModel {
                    name: self.name.clone(),
                    version: target.version.clone(),
                    source_uri: target.source_uri.clone(),
                    predictor,
                    loaded_at: Utc::now(),
                });
                self.state.store(Arc::new(SlotState::Ready(model.clone())));
                *self.last_failure.lock() = None;

                tracing::info!(
                    model = %self.name,
                    version = %model.version,
                    previous_version = ?previous.as_ref().map(|p| p.version.as_str()),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model published"
                );
                metrics::record_model_load(&self.name, true);

                Ok(model)
            }
            Err(message) => {
                self.state.store(Arc::new(match previous {
                    Some(model) => SlotState::Ready(model),
                    None => SlotState::Unloaded,
                }));
                *self.last_failure.lock() = Some(LoadFailure {
                    version: target.version.clone(),
                    at: clock.now(),
                    message: message.clone(),
                });

                tracing::warn!(
                    model = %self.name,
                    version = %target.version,
                    error = %message,
                    "Model load failed"
                );
                metrics::record_model_load(&self.name, false);

                Err(ServeError::ModelLoad {
                    name: self.name.clone(),
                    version: target.version.clone(),
                    message,
                })
            }
        }
    }

    fn info(&self) -> ModelInfo {
        let target = self.target.load();
        let state = self.state.load();
        let current = state.current();

        ModelInfo {
            name: self.name.clone(),
            status: state.status(),
            loaded_version: current.map(|m| m.version.clone()),
            manifest_version: target.version.clone(),
            source_uri: target.source_uri.clone(),
            stale: current.is_some_and(|m| m.version != target.version),
            retired: self.retired_at.lock().is_some(),
            loaded_at: current.map(|m| m.loaded_at),
            last_error: self.last_failure.lock().as_ref().map(|f| f.message.clone()),
        }
    }
}

#[derive(Default)]
struct Catalog {
    manifest: Manifest,
    slots: HashMap<String, Arc<ModelSlot>>,
}

/// Registry of manifest-backed models with lazy loading and hot swaps
pub struct ModelRegistry {
    store: Arc<dyn ArtifactStore>,
    loader: Arc<dyn ModelLoader>,
    clock: Arc<dyn Clock>,
    location: ManifestLocation,
    policy: RegistryPolicy,
    catalog: RwLock<Catalog>,
    initialized: OnceCell<()>,
    /// Serializes manifest fetches
    refresh_guard: AsyncMutex<()>,
    /// Last manifest fetch attempt
    last_checked: Mutex<Option<Instant>>,
}

impl ModelRegistry {
    /// Create a registry using the system clock
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        loader: Arc<dyn ModelLoader>,
        location: ManifestLocation,
        policy: RegistryPolicy,
    ) -> Self {
        Self {
            store,
            loader,
            clock: Arc::new(SystemClock),
            location,
            policy,
            catalog: RwLock::new(Catalog::default()),
            initialized: OnceCell::new(),
            refresh_guard: AsyncMutex::new(()),
            last_checked: Mutex::new(None),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &RegistryPolicy {
        &self.policy
    }

    pub fn location(&self) -> &ManifestLocation {
        &self.location
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Fetch the manifest on first use; later calls return immediately.
    /// A failed first fetch is returned to the caller and retried by the next one.
    pub async fn ensure_manifest_loaded(&self) -> ServeResult<()> {
        self.initialized
            .get_or_try_init(|| async {
                let now = self.clock.now();
                let manifest = self.fetch_manifest().await.map_err(|e| {
                    tracing::error!(
                        manifest = %self.location,
                        error = %format!("{:#}", e),
                        "Initial manifest fetch failed"
                    );
                    ServeError::ManifestFetch {
                        message: format!("{:#}", e),
                    }
                })?;

                *self.last_checked.lock() = Some(now);
                let mut catalog = self.catalog.write().await;
                self.apply_manifest(&mut catalog, manifest, now);

                tracing::info!(
                    manifest = %self.location,
                    models = catalog.slots.len(),
                    "Manifest loaded"
                );
                Ok::<(), ServeError>(())
            })
            .await
            .map(|_| ())
    }

    /// Re-fetch the manifest if the refresh interval has elapsed.
    ///
    /// Fetch failures keep the previous manifest and are only logged. Returns the
    /// applied changes when a fetch happened and succeeded.
    pub async fn maybe_refresh_manifest(&self, now: Instant) -> Option<ManifestDiff> {
        if self.initialized.get().is_none() || !self.refresh_due(now) {
            return None;
        }

        // Someone else is already fetching; keep serving the current manifest
        let Ok(_guard) = self.refresh_guard.try_lock() else {
            return None;
        };
        if !self.refresh_due(now) {
            return None;
        }
        *self.last_checked.lock() = Some(now);

        match self.fetch_manifest().await {
            Ok(manifest) => {
                let diff = {
                    let mut catalog = self.catalog.write().await;
                    self.apply_manifest(&mut catalog, manifest, now)
                };
                self.evict_retired(now).await;
                Some(diff)
            }
            Err(e) => {
                tracing::warn!(
                    manifest = %self.location,
                    error = %format!("{:#}", e),
                    "Manifest refresh failed, keeping previous manifest"
                );
                None
            }
        }
    }

    /// Fetch and apply the manifest now, regardless of the refresh interval
    pub async fn refresh_now(&self) -> ServeResult<ManifestDiff> {
        self.ensure_manifest_loaded().await?;

        let _guard = self.refresh_guard.lock().await;
        let now = self.clock.now();
        *self.last_checked.lock() = Some(now);

        let manifest = self
            .fetch_manifest()
            .await
            .map_err(|e| ServeError::ManifestFetch {
                message: format!("{:#}", e),
            })?;

        let diff = {
            let mut catalog = self.catalog.write().await;
            self.apply_manifest(&mut catalog, manifest, now)
        };
        self.evict_retired(now).await;

        Ok(diff)
    }

    /// Resolve a model name to a ready predictor.
    ///
    /// Loads lazily on first use and reloads when the manifest version moved.
    /// A failed reload keeps serving the last published predictor; the error is
    /// only surfaced when nothing was ever loaded for the name.
    pub async fn resolve(&self, name: &str) -> ServeResult<Arc<LoadedModel>> {
        self.ensure_manifest_loaded().await?;

        let now = self.clock.now();
        self.maybe_refresh_manifest(now).await;

        let slot = self
            .slot(name)
            .await
            .ok_or_else(|| ServeError::ModelNotFound {
                name: name.to_string(),
            })?;
        *slot.last_resolved.lock() = Some(now);

        if let Some(model) = slot.fresh() {
            return Ok(model);
        }

        match self.load_slot(&slot, now).await {
            Ok(model) => Ok(model),
            Err(err) => match slot.current() {
                Some(previous) => {
                    tracing::warn!(
                        model = %name,
                        serving_version = %previous.version,
                        error = %err,
                        "Reload failed, serving last known-good predictor"
                    );
                    metrics::record_fallback(name);
                    Ok(previous)
                }
                None => Err(ServeError::ModelUnavailable {
                    name: name.to_string(),
                    reason: err.to_string(),
                }),
            },
        }
    }

    /// Version of the predictor currently served for `name`
    pub async fn version_of(&self, name: &str) -> Option<String> {
        self.slot(name)
            .await
            .and_then(|slot| slot.current())
            .map(|model| model.version.clone())
    }

    /// Snapshot of one model
    pub async fn info(&self, name: &str) -> Option<ModelInfo> {
        self.slot(name).await.map(|slot| slot.info())
    }

    /// Snapshot of all models, sorted by name
    pub async fn list(&self) -> Vec<ModelInfo> {
        let catalog = self.catalog.read().await;
        let mut infos: Vec<_> = catalog.slots.values().map(|slot| slot.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Number of models with a published predictor
    pub async fn loaded_count(&self) -> usize {
        let catalog = self.catalog.read().await;
        catalog
            .slots
            .values()
            .filter(|slot| slot.current().is_some())
            .count()
    }

    /// Drop retired models whose grace period has passed, returning their names
    pub async fn evict_retired(&self, now: Instant) -> Vec<String> {
        let mut catalog = self.catalog.write().await;
        let grace = self.policy.eviction_grace;

        let mut expired: Vec<String> = catalog
            .slots
            .values()
            .filter(|slot| slot.eviction_due(now, grace))
            .map(|slot| slot.name.clone())
            .collect();
        expired.sort();

        for name in &expired {
            catalog.slots.remove(name);
            tracing::info!(model = %name, "Evicted retired model");
            metrics::record_eviction(name);
        }

        expired
    }

    async fn slot(&self, name: &str) -> Option<Arc<ModelSlot>> {
        self.catalog.read().await.slots.get(name).cloned()
    }

    fn refresh_due(&self, now: Instant) -> bool {
        match *self.last_checked.lock() {
            Some(last) => now.saturating_duration_since(last) >= self.policy.refresh_interval,
            None => true,
        }
    }

    async fn fetch_manifest(&self) -> anyhow::Result<Manifest> {
        let fetch = self.store.get(&self.location.bucket, &self.location.key);

        let result = match timeout(self.policy.fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => {
                metrics::record_manifest_fetch(false);
                anyhow::bail!(
                    "timed out after {}s fetching manifest {}",
                    self.policy.fetch_timeout.as_secs_f64(),
                    self.location
                );
            }
        };

        let parsed = result
            .with_context(|| format!("Failed to fetch manifest {}", self.location))
            .and_then(|body| body.with_context(|| format!("Manifest {} not found", self.location)))
            .and_then(|body| Manifest::parse(&body));

        metrics::record_manifest_fetch(parsed.is_ok());
        parsed
    }

    /// Merge a freshly fetched manifest into the catalog
    fn apply_manifest(
        &self,
        catalog: &mut Catalog,
        manifest: Manifest,
        now: Instant,
    ) -> ManifestDiff {
        let diff = catalog.manifest.diff(&manifest);

        for entry in manifest.entries() {
            match catalog.slots.get(&entry.name) {
                Some(slot) => {
                    if slot.retired_at.lock().take().is_some() {
                        tracing::info!(model = %entry.name, "Retired model reinstated by manifest");
                    }
                    let previous = slot.target.load();
                    if previous.version != entry.version {
                        tracing::info!(
                            model = %entry.name,
                            from_version = %previous.version,
                            to_version = %entry.version,
                            "Manifest version changed, predictor marked stale"
                        );
                    }
                    slot.target.store(Arc::new(entry.clone()));
                }
                None => {
                    tracing::debug!(
                        model = %entry.name,
                        version = %entry.version,
                        "Model registered from manifest"
                    );
                    catalog
                        .slots
                        .insert(entry.name.clone(), Arc::new(ModelSlot::new(entry.clone())));
                }
            }
        }

        for name in &diff.removed {
            if let Some(slot) = catalog.slots.get(name) {
                let mut retired_at = slot.retired_at.lock();
                if retired_at.is_none() {
                    *retired_at = Some(now);
                    tracing::info!(model = %name, "Model removed from manifest, retiring");
                }
            }
        }

        catalog.manifest = manifest;
        diff
    }

    /// Run the load for `slot` in a detached task so a cancelled caller does not
    /// abort a load that other callers are waiting on
    async fn load_slot(
        &self,
        slot: &Arc<ModelSlot>,
        requested_at: Instant,
    ) -> ServeResult<Arc<LoadedModel>> {
        let slot = Arc::clone(slot);
        let loader = Arc::clone(&self.loader);
        let clock = Arc::clone(&self.clock);
        let load_timeout = self.policy.load_timeout;
        let backoff = self.policy.load_retry_backoff;

        let task = tokio::spawn(async move {
            let _guard = slot.load_lock.lock().await;

            // Published by the holder we queued behind
            if let Some(model) = slot.fresh() {
                return Ok(model);
            }

            let target = slot.target.load_full();
            let now = clock.now();
            if let Some(err) = slot.recent_failure(&target.version, requested_at, now, backoff) {
                return Err(err);
            }

            slot.load_and_publish(loader.as_ref(), &target, load_timeout, clock.as_ref())
                .await
        });

        task.await.map_err(|e| ServeError::Internal {
            message: format!("model load task failed: {}", e),
        })?
    }
}
