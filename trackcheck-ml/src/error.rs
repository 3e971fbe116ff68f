//! Error types for the trackcheck-ml crate.

use thiserror::Error;

/// Top-level error type for model fitting and artifact serialization.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model is not fitted: call fit() before {0}")]
    NotFitted(&'static str),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Model descriptor error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MlError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn numerical(msg: impl Into<String>) -> Self {
        Self::Numerical(msg.into())
    }
}
