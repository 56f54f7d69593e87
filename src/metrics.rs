//! Prometheus metrics

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Setup Prometheus metrics exporter
/// Returns a handle that can be used to retrieve metrics
pub fn setup_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!("Prometheus metrics exporter installed");

    Ok(handle)
}

fn outcome(success: bool) -> &'static str {
    if success { "success" } else { "failure" }
}

/// Record a prediction request
pub fn record_prediction(model: &str, success: bool) {
    metrics::counter!("model_swap_predictions_total",
        "model" => model.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);
}

/// Record a model load attempt
pub fn record_model_load(model: &str, success: bool) {
    metrics::counter!("model_swap_model_loads_total",
        "model" => model.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);
}

/// Record a manifest fetch attempt
pub fn record_manifest_fetch(success: bool) {
    metrics::counter!("model_swap_manifest_fetches_total",
        "outcome" => outcome(success)
    )
    .increment(1);
}

/// Record a request served by the last known-good predictor after a failed reload
pub fn record_fallback(model: &str) {
    metrics::counter!("model_swap_fallbacks_total",
        "model" => model.to_string()
    )
    .increment(1);
}

/// Record eviction of a retired model
pub fn record_eviction(model: &str) {
    metrics::counter!("model_swap_evictions_total",
        "model" => model.to_string()
    )
    .increment(1);
}

/// Update loaded model count gauge
pub fn update_loaded_models(count: usize) {
    metrics::gauge!("model_swap_models_loaded").set(count as f64);
}
