//! Prediction service: resolve a model, run it, report provenance

use crate::error::{ServeError, ServeResult};
use crate::metrics;
use crate::models::{ModelRegistry, check_feature_matrix};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Prediction result with the version of the model that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub prediction: Vec<f64>,
    pub model_version: String,
}

/// Thin layer between the transport and the registry
#[derive(Clone)]
pub struct PredictionService {
    registry: Arc<ModelRegistry>,
}

impl PredictionService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Predict one value per feature row
    pub async fn predict(
        &self,
        model_name: &str,
        features: &[Vec<f64>],
    ) -> ServeResult<Prediction> {
        let result = self.predict_inner(model_name, features).await;
        metrics::record_prediction(model_name, result.is_ok());
        result
    }

    async fn predict_inner(
        &self,
        model_name: &str,
        features: &[Vec<f64>],
    ) -> ServeResult<Prediction> {
        if features.is_empty() {
            return Err(ServeError::InvalidInput {
                message: "data must contain at least one feature row".to_string(),
            });
        }

        // The handle pins predictor and version together for this request
        let model = self.registry.resolve(model_name).await?;

        check_feature_matrix(features, model.predictor.n_features())?;
        let prediction = model.predict(features)?;

        tracing::debug!(
            model = %model_name,
            version = %model.version,
            rows = features.len(),
            "Prediction served"
        );

        Ok(Prediction {
            prediction,
            model_version: model.version.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Manifest, ManifestEntry, ManifestLocation};
    use crate::models::{LinearModel, ModelArtifact, RegistryPolicy, StoreModelLoader};
    use crate::store::{ArtifactStore, MemoryStore};

    async fn service_with_model() -> PredictionService {
        let store = Arc::new(MemoryStore::new());
        let artifact = ModelArtifact::LinearRegression(LinearModel::new(vec![1.0, 1.0, 1.0], 0.5));
        store
            .put("models", "iris/v1/model.json", &serde_json::to_vec(&artifact).unwrap())
            .await
            .unwrap();

        let manifest: Manifest = [ManifestEntry::new("iris_model", "iris/v1/model.json", "1")]
            .into_iter()
            .collect();
        store
            .put(
                "models",
                "manifest.json",
                manifest.to_json_pretty().unwrap().as_bytes(),
            )
            .await
            .unwrap();

        let loader = Arc::new(StoreModelLoader::new(store.clone(), "models"));
        let registry = Arc::new(ModelRegistry::new(
            store,
            loader,
            ManifestLocation::new("models", "manifest.json"),
            RegistryPolicy::default(),
        ));
        PredictionService::new(registry)
    }

    #[tokio::test]
    async fn test_predict() {
        let service = service_with_model().await;
        let result = service
            .predict("iris_model", &[vec![5.1, 3.5, 0.2], vec![1.0, 1.0, 1.0]])
            .await
            .unwrap();

        assert_eq!(result.model_version, "1");
        assert_eq!(result.prediction.len(), 2);
        assert!((result.prediction[0] - 9.3).abs() < 1e-9);
        assert!((result.prediction[1] - 3.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_predict_rejects_shape_mismatch() {
        let service = service_with_model().await;
        let err = service
            .predict("iris_model", &[vec![5.1, 3.5]])
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_predict_rejects_empty_before_loading() {
        let service = service_with_model().await;
        let err = service.predict("iris_model", &[]).await.unwrap_err();
        assert!(matches!(err, ServeError::InvalidInput { .. }));
        assert_eq!(service.registry().loaded_count().await, 0);
    }

    #[tokio::test]
    async fn test_predict_unknown_model() {
        let service = service_with_model().await;
        let err = service
            .predict("nope", &[vec![1.0, 2.0, 3.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::ModelNotFound { .. }));
    }

    #[test]
    fn test_prediction_serializes_camel_case() {
        let p = Prediction {
            prediction: vec![1.5],
            model_version: "2".into(),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["modelVersion"], "2");
        assert_eq!(json["prediction"][0], 1.5);
    }
}
