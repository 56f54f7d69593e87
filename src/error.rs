//! Error types for the registry, prediction service and API responses

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Errors surfaced to callers of the prediction service
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// Manifest could not be fetched and no previous manifest exists
    #[error("manifest fetch failed: {message}")]
    ManifestFetch { message: String },

    /// Loader failed for one version. `resolve` turns this into a fallback to the
    /// last good predictor or into `ModelUnavailable`, so it stays inside the registry.
    #[error("failed to load model '{name}' version {version}: {message}")]
    ModelLoad {
        name: String,
        version: String,
        message: String,
    },

    /// No predictor could be produced and none was cached
    #[error("model '{name}' is unavailable: {reason}")]
    ModelUnavailable { name: String, reason: String },

    #[error("model '{name}' not found in manifest")]
    ModelNotFound { name: String },

    /// Malformed feature payload
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

pub type ServeResult<T> = Result<T, ServeError>;

impl ServeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServeError::ManifestFetch { .. } | ServeError::ModelUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServeError::ModelLoad { .. } => StatusCode::BAD_GATEWAY,
            ServeError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            ServeError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            ServeError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::models::PredictError> for ServeError {
    fn from(err: crate::models::PredictError) -> Self {
        ServeError::InvalidInput {
            message: err.to_string(),
        }
    }
}

/// Request bodies that fail to parse are malformed feature payloads
impl From<JsonRejection> for ServeError {
    fn from(rejection: JsonRejection) -> Self {
        ServeError::InvalidInput {
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            ServeError::Internal { .. } => {
                tracing::error!(error = %self, "Internal error");
            }
            _ => {
                tracing::debug!(error = %self, status = %status, "Request failed");
            }
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            timestamp: chrono::Utc::now(),
        });

        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                ServeError::ManifestFetch {
                    message: "x".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServeError::ModelUnavailable {
                    name: "m".into(),
                    reason: "x".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServeError::ModelNotFound { name: "m".into() },
                StatusCode::NOT_FOUND,
            ),
            (
                ServeError::InvalidInput {
                    message: "x".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                ServeError::Internal {
                    message: "x".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "{}", err);
        }
    }

    #[test]
    fn test_display_includes_model_name() {
        let err = ServeError::ModelUnavailable {
            name: "iris_model".into(),
            reason: "loader timed out".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("iris_model"));
        assert!(msg.contains("loader timed out"));
    }
}
