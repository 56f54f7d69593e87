//! model-swap - prediction serving with zero-downtime model swaps
//!
//! A lightweight Rust service that serves predictions from versioned model
//! artifacts and hot-swaps to newer versions as they appear in the manifest.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod manifest;
pub mod metrics;
pub mod models;
pub mod publish;
pub mod refresh;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServeConfig;
pub use error::{ServeError, ServeResult};
pub use manifest::{Manifest, ManifestDiff, ManifestEntry, ManifestLocation};
pub use models::{
    LoadedModel, ModelInfo, ModelLoader, ModelRegistry, ModelStatus, Predictor, RegistryPolicy,
    StoreModelLoader,
};
pub use refresh::RefreshMonitor;
pub use service::{Prediction, PredictionService};
pub use store::{ArtifactStore, FileSystemStore, MemoryStore};
