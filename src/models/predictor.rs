//! Predictor contract and the serialized model artifacts the loader understands

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Violations of the predictor input contract
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    #[error("feature matrix is empty")]
    Empty,

    #[error("row {row} has {actual} features, model expects {expected}")]
    FeatureCount {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("row {row} contains a non-finite value at column {column}")]
    NonFinite { row: usize, column: usize },
}

/// In-memory model ready to answer queries
pub trait Predictor: Send + Sync + fmt::Debug {
    /// Width of each feature row
    fn n_features(&self) -> usize;

    /// One output per input row
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, PredictError>;
}

/// Check that a feature matrix is non-empty, rectangular with `expected` columns and finite
pub fn check_feature_matrix(rows: &[Vec<f64>], expected: usize) -> Result<(), PredictError> {
    if rows.is_empty() {
        return Err(PredictError::Empty);
    }

    for (row, values) in rows.iter().enumerate() {
        if values.len() != expected {
            return Err(PredictError::FeatureCount {
                row,
                expected,
                actual: values.len(),
            });
        }
        if let Some(column) = values.iter().position(|v| !v.is_finite()) {
            return Err(PredictError::NonFinite { row, column });
        }
    }

    Ok(())
}

/// Serialized artifact document, tagged by model kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LinearRegression(LinearModel),
}

impl ModelArtifact {
    pub fn from_json(bytes: &[u8]) -> anyhow::Result<Self> {
        let artifact: ModelArtifact = serde_json::from_slice(bytes)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            ModelArtifact::LinearRegression(model) => model.validate(),
        }
    }

    pub fn into_predictor(self) -> Arc<dyn Predictor> {
        match self {
            ModelArtifact::LinearRegression(model) => Arc::new(model),
        }
    }
}

/// Ordinary least squares regression: `y = intercept + coefficients · x`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_names: Vec<String>,
}

impl LinearModel {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
            feature_names: Vec::new(),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.coefficients.is_empty() {
            anyhow::bail!("linear model has no coefficients");
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            anyhow::bail!("linear model has non-finite parameters");
        }
        if !self.feature_names.is_empty() && self.feature_names.len() != self.coefficients.len()
        {
            anyhow::bail!(
                "linear model names {} features but has {} coefficients",
                self.feature_names.len(),
                self.coefficients.len()
            );
        }
        Ok(())
    }
}

impl Predictor for LinearModel {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, PredictError> {
        check_feature_matrix(rows, self.n_features())?;

        Ok(rows
            .iter()
            .map(|row| {
                self.intercept
                    + row
                        .iter()
                        .zip(&self.coefficients)
                        .map(|(x, w)| x * w)
                        .sum::<f64>()
            })
            .collect())
    }
}
