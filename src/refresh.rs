//! Background manifest refresh and retired-model eviction

use crate::models::ModelRegistry;
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};

/// Periodically checks the manifest so staleness is noticed without traffic
pub struct RefreshMonitor {
    registry: Arc<ModelRegistry>,
    check_interval: Duration,
}

impl RefreshMonitor {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        let check_interval = registry.policy().refresh_interval;
        Self {
            registry,
            check_interval,
        }
    }

    /// Start monitoring loop
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.check_interval.as_secs(),
            manifest = %self.registry.location(),
            "Manifest refresh monitor started"
        );

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One refresh pass
    pub async fn tick(&self) {
        if let Err(e) = self.registry.ensure_manifest_loaded().await {
            tracing::warn!(error = %e, "Manifest not yet available");
            return;
        }

        let now = self.registry.now();
        if let Some(diff) = self.registry.maybe_refresh_manifest(now).await
            && !diff.is_empty()
        {
            tracing::info!(
                changed = ?diff.changed,
                added = ?diff.added,
                removed = ?diff.removed,
                "Manifest changes applied"
            );
        }

        self.registry.evict_retired(now).await;
        crate::metrics::update_loaded_models(self.registry.loaded_count().await);
    }
}
