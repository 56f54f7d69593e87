//! Model management module
//!
//! Provides functionality for:
//! - The predictor contract and the serialized artifacts behind it
//! - Loading artifacts from the artifact store
//! - The registry that lazily loads, refreshes and hot-swaps predictors

pub mod loader;
pub mod predictor;
pub mod registry;

pub use loader::{ArtifactLocation, ModelLoader, STORE_SCHEME, StoreModelLoader};
pub use predictor::{LinearModel, ModelArtifact, PredictError, Predictor, check_feature_matrix};
pub use registry::{
    LoadedModel, ModelInfo, ModelRegistry, ModelStatus, RegistryPolicy, SlotState,
};
