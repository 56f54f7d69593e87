//! API request handlers

use super::models::{HealthResponse, InvokeBody, InvokeRequest, InvokeResponse, PredictRequest};
use super::routes::AppState;
use crate::error::ServeError;
use crate::manifest::ManifestDiff;
use crate::models::ModelInfo;
use crate::service::Prediction;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};

/// GET /health - Server health check
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now(),
        }),
    )
}

/// GET /metrics - Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// POST /invoke - Function-style invocation with a status envelope
///
/// Every outcome, including an unparseable body, is answered with the envelope.
pub async fn invoke(
    State(state): State<AppState>,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> (StatusCode, Json<InvokeResponse>) {
    let (model, result) = match payload {
        Ok(Json(req)) => {
            let model = req.model.unwrap_or_else(|| state.default_model.to_string());
            tracing::info!(model = %model, rows = req.data.len(), "Invocation received");

            let result = state.service.predict(&model, &req.data).await;
            (model, result)
        }
        Err(rejection) => (state.default_model.to_string(), Err(rejection.into())),
    };

    let (status, body) = match result {
        Ok(prediction) => (StatusCode::OK, InvokeBody::Prediction(prediction)),
        Err(e) => {
            let status = e.status_code();
            tracing::warn!(model = %model, error = %e, status = %status, "Invocation failed");
            (status, InvokeBody::Error { error: e.to_string() })
        }
    };

    (
        status,
        Json(InvokeResponse {
            status_code: status.as_u16(),
            body,
        }),
    )
}

/// POST /models/{name}/predict - Predict with a named model
pub async fn predict(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<Prediction>, ServeError> {
    let Json(req) = payload?;
    let prediction = state.service.predict(&name, &req.data).await?;
    Ok(Json(prediction))
}

/// GET /models - List all models known to the registry
pub async fn list_models(
    State(state): State<AppState>,
) -> Result<Json<Vec<ModelInfo>>, ServeError> {
    state.registry.ensure_manifest_loaded().await?;

    let models = state.registry.list().await;
    let loaded = models.iter().filter(|m| m.loaded_version.is_some()).count();
    crate::metrics::update_loaded_models(loaded);

    Ok(Json(models))
}

/// GET /models/{name} - Get model details
pub async fn get_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ModelInfo>, ServeError> {
    state.registry.ensure_manifest_loaded().await?;

    let info = state
        .registry
        .info(&name)
        .await
        .ok_or(ServeError::ModelNotFound { name })?;

    Ok(Json(info))
}

/// POST /manifest/refresh - Re-fetch the manifest immediately
pub async fn refresh_manifest(
    State(state): State<AppState>,
) -> Result<Json<ManifestDiff>, ServeError> {
    let diff = state.registry.refresh_now().await?;

    tracing::info!(
        changed = ?diff.changed,
        added = ?diff.added,
        removed = ?diff.removed,
        "Manifest refreshed on request"
    );

    Ok(Json(diff))
}
