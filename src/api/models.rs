//! API request and response models

use crate::service::Prediction;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Feature rows for a named-model prediction
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictRequest {
    pub data: Vec<Vec<f64>>,
}

/// Function-style invocation payload
#[derive(Debug, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub data: Vec<Vec<f64>>,

    /// Model to use; the configured default model if not provided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Function-style invocation envelope; `status_code` mirrors the HTTP status
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    pub status_code: u16,
    pub body: InvokeBody,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvokeBody {
    Prediction(Prediction),
    Error { error: String },
}
