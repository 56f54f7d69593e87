//! API route definitions

use crate::models::ModelRegistry;
use crate::service::PredictionService;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
    pub registry: Arc<ModelRegistry>,
    pub default_model: Arc<str>,
    pub prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl AppState {
    pub fn new(
        registry: Arc<ModelRegistry>,
        default_model: impl Into<Arc<str>>,
        prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
    ) -> Self {
        Self {
            service: PredictionService::new(registry.clone()),
            registry,
            default_model: default_model.into(),
            prometheus_handle,
        }
    }
}

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and status
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Predictions
        .route("/invoke", post(handlers::invoke))
        .route("/models/{name}/predict", post(handlers::predict))
        // Registry introspection
        .route("/models", get(handlers::list_models))
        .route("/models/{name}", get(handlers::get_model))
        .route("/manifest/refresh", post(handlers::refresh_manifest))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
