//! Integration tests that run the API in-process
//!
//! Artifacts and the manifest live in a temporary directory served through
//! `FileSystemStore`, and models are published with the same code path the
//! `publish-model` binary uses.

use axum_test::TestServer;
use model_swap::{
    FileSystemStore, ManifestLocation, ModelRegistry, RegistryPolicy, StoreModelLoader,
    api::{AppState, create_router},
    metrics,
    models::{LinearModel, ModelArtifact},
    publish::{PublishRequest, artifact_key, publish_model},
    store::ArtifactStore,
};
use serde_json::json;
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

const BUCKET: &str = "models";
const MANIFEST_KEY: &str = "manifests/model_list.json";

// Global metrics handle - only initialize once per test process
static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| metrics::setup_metrics().expect("Failed to setup metrics"))
        .clone()
}

struct TestApp {
    server: TestServer,
    store: Arc<FileSystemStore>,
    _temp_dir: TempDir,
}

impl TestApp {
    /// Publish a linear model whose prediction is `intercept + sum(x)` over three features
    async fn publish(&self, name: &str, intercept: f64) -> String {
        let artifact =
            ModelArtifact::LinearRegression(LinearModel::new(vec![1.0, 1.0, 1.0], intercept));
        let published = publish_model(
            self.store.as_ref(),
            &ManifestLocation::new(BUCKET, MANIFEST_KEY),
            PublishRequest {
                model_name: name.to_string(),
                artifact: serde_json::to_vec(&artifact).unwrap(),
                version: None,
            },
        )
        .await
        .expect("Failed to publish model");

        published.entry.version
    }
}

/// Helper to create a test server with the API
async fn create_test_app() -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(FileSystemStore::new(temp_dir.path()));
    let loader = Arc::new(StoreModelLoader::new(store.clone(), BUCKET));

    let registry = Arc::new(ModelRegistry::new(
        store.clone(),
        loader,
        ManifestLocation::new(BUCKET, MANIFEST_KEY),
        RegistryPolicy::default(),
    ));

    let state = AppState::new(registry, "iris_model", get_metrics_handle());
    let server = TestServer::try_new(create_router(state)).expect("Failed to create test server");

    TestApp {
        server,
        store,
        _temp_dir: temp_dir,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app().await;

    let response = app.server.get("/health").await;

    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_invoke_default_model() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;

    let response = app
        .server
        .post("/invoke")
        .json(&json!({"data": [[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]]}))
        .await;

    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["statusCode"], 200);
    assert_eq!(body["body"]["prediction"], json!([6.5, 0.5]));
    assert_eq!(body["body"]["modelVersion"], "1");
}

#[tokio::test]
async fn test_invoke_named_model() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;
    app.publish("other_model", 10.0).await;

    let response = app
        .server
        .post("/invoke")
        .json(&json!({"data": [[1.0, 1.0, 1.0]], "model": "other_model"}))
        .await;

    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["body"]["prediction"], json!([13.0]));
}

#[tokio::test]
async fn test_invoke_unknown_model() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;

    let response = app
        .server
        .post("/invoke")
        .json(&json!({"data": [[1.0, 2.0, 3.0]], "model": "missing"}))
        .await;

    assert_eq!(response.status_code(), 404);

    let body: serde_json::Value = response.json();
    assert_eq!(body["statusCode"], 404);
    assert!(body["body"]["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_invoke_rejects_bad_shapes() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;

    let response = app
        .server
        .post("/invoke")
        .json(&json!({"data": [[1.0, 2.0]]}))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body["statusCode"], 400);

    let response = app.server.post("/invoke").json(&json!({"data": []})).await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_invoke_without_manifest_is_unavailable() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/invoke")
        .json(&json!({"data": [[1.0, 2.0, 3.0]]}))
        .await;

    assert_eq!(response.status_code(), 503);

    let body: serde_json::Value = response.json();
    assert_eq!(body["statusCode"], 503);
    assert!(
        body["body"]["error"]
            .as_str()
            .unwrap()
            .contains("manifest fetch failed")
    );
}

#[tokio::test]
async fn test_predict_endpoint() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;

    let response = app
        .server
        .post("/models/iris_model/predict")
        .json(&json!({"data": [[5.0, 0.0, 0.0]]}))
        .await;

    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["prediction"], json!([5.5]));
    assert_eq!(body["modelVersion"], "1");
}

#[tokio::test]
async fn test_predict_unknown_model() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;

    let response = app
        .server
        .post("/models/nonexistent/predict")
        .json(&json!({"data": [[1.0, 2.0, 3.0]]}))
        .await;

    assert_eq!(response.status_code(), 404);

    let body: serde_json::Value = response.json();
    assert!(body["error"].is_string());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_list_models_shows_lazy_loading() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;
    app.publish("other_model", 1.0).await;

    let response = app.server.get("/models").await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    let models = body.as_array().unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0]["name"], "iris_model");
    assert!(models.iter().all(|m| m["status"] == "unloaded"));

    app.server
        .post("/invoke")
        .json(&json!({"data": [[1.0, 2.0, 3.0]]}))
        .await;

    let response = app.server.get("/models/iris_model").await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["loaded_version"], "1");
    assert_eq!(body["stale"], false);

    let response = app.server.get("/models/other_model").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "unloaded");
}

#[tokio::test]
async fn test_get_unknown_model() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;

    let response = app.server.get("/models/nonexistent").await;

    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_refresh_swaps_to_new_version() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;

    let invoke = json!({"data": [[1.0, 2.0, 3.0]]});
    let body: serde_json::Value = app.server.post("/invoke").json(&invoke).await.json();
    assert_eq!(body["body"]["modelVersion"], "1");

    assert_eq!(app.publish("iris_model", 100.5).await, "2");

    // Within the refresh interval the cached manifest still names v1
    let body: serde_json::Value = app.server.post("/invoke").json(&invoke).await.json();
    assert_eq!(body["body"]["modelVersion"], "1");

    let response = app.server.post("/manifest/refresh").await;
    assert_eq!(response.status_code(), 200);
    let diff: serde_json::Value = response.json();
    assert_eq!(diff["changed"], json!(["iris_model"]));

    let body: serde_json::Value = app.server.post("/invoke").json(&invoke).await.json();
    assert_eq!(body["statusCode"], 200);
    assert_eq!(body["body"]["modelVersion"], "2");
    assert_eq!(body["body"]["prediction"], json!([106.5]));
}

#[tokio::test]
async fn test_corrupt_new_version_keeps_serving_previous() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;

    let invoke = json!({"data": [[1.0, 2.0, 3.0]]});
    app.server.post("/invoke").json(&invoke).await;

    app.publish("iris_model", 100.5).await;
    app.store
        .put(BUCKET, &artifact_key("iris_model", "2"), b"not a model")
        .await
        .unwrap();
    app.server.post("/manifest/refresh").await;

    let response = app.server.post("/invoke").json(&invoke).await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["body"]["modelVersion"], "1");
    assert_eq!(body["body"]["prediction"], json!([6.5]));

    let info: serde_json::Value = app.server.get("/models/iris_model").await.json();
    assert_eq!(info["stale"], true);
    assert_eq!(info["manifest_version"], "2");
    assert!(info["last_error"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;
    app.server
        .post("/invoke")
        .json(&json!({"data": [[1.0, 2.0, 3.0]]}))
        .await;

    let response = app.server.get("/metrics").await;

    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains("model_swap_predictions_total"));
}

#[tokio::test]
async fn test_unresolved_alias_is_unavailable() {
    let app = create_test_app().await;
    app.store
        .put(
            BUCKET,
            MANIFEST_KEY,
            br#"{"iris_model": {"path": "models:/iris_model/7", "version": "7"}}"#,
        )
        .await
        .unwrap();

    let response = app
        .server
        .post("/invoke")
        .json(&json!({"data": [[1.0, 2.0, 3.0]]}))
        .await;

    assert_eq!(response.status_code(), 503);

    let body: serde_json::Value = response.json();
    assert!(
        body["body"]["error"]
            .as_str()
            .unwrap()
            .contains("Unresolved model alias")
    );
}

#[tokio::test]
async fn test_invoke_malformed_payload_keeps_envelope() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;

    let response = app
        .server
        .post("/invoke")
        .json(&json!({"data": [[1.0, "x", 3.0]]}))
        .await;

    assert_eq!(response.status_code(), 400);

    let body: serde_json::Value = response.json();
    assert_eq!(body["statusCode"], 400);
    assert!(
        body["body"]["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid input")
    );
}

#[tokio::test]
async fn test_predict_malformed_payload_is_bad_request() {
    let app = create_test_app().await;
    app.publish("iris_model", 0.5).await;

    let response = app
        .server
        .post("/models/iris_model/predict")
        .json(&json!({"data": [[1.0, "x", 3.0]]}))
        .await;

    assert_eq!(response.status_code(), 400);

    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().starts_with("invalid input"));
    assert!(body["timestamp"].is_string());
}
