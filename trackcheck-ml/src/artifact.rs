//! Serialized model artifacts in the MLflow `MLmodel` layout.
//!
//! An artifact directory holds two files: `model.json` with the fitted model
//! and an `MLmodel` YAML descriptor naming the flavor that can load it.

use crate::error::MlError;
use crate::linear::LinearRegression;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FLAVOR_NAME: &str = "trackcheck.linear_regression";
pub const DESCRIPTOR_FILE: &str = "MLmodel";
pub const MODEL_DATA_FILE: &str = "model.json";
const FORMAT_VERSION: u32 = 1;

/// Per-flavor loading information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorConfig {
    pub data: String,
    pub format_version: u32,
    pub fit_intercept: bool,
    pub n_features: usize,
}

/// Contents of the `MLmodel` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub artifact_path: String,
    pub run_id: String,
    pub model_uuid: String,
    pub utc_time_created: String,
    pub flavors: BTreeMap<String, FlavorConfig>,
}

/// A fitted model ready to be uploaded under `artifact_path`.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub descriptor: ModelDescriptor,
    model_json: Vec<u8>,
}

impl ModelArtifact {
    pub fn from_model(
        model: &LinearRegression,
        artifact_path: &str,
        run_id: &str,
    ) -> Result<Self, MlError> {
        let n_features = model.n_features().ok_or(MlError::NotFitted("serialize"))?;
        let mut flavors = BTreeMap::new();
        flavors.insert(
            FLAVOR_NAME.to_string(),
            FlavorConfig {
                data: MODEL_DATA_FILE.to_string(),
                format_version: FORMAT_VERSION,
                fit_intercept: model.fit_intercept,
                n_features,
            },
        );

        Ok(Self {
            descriptor: ModelDescriptor {
                artifact_path: artifact_path.to_string(),
                run_id: run_id.to_string(),
                model_uuid: uuid::Uuid::new_v4().simple().to_string(),
                utc_time_created: Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
                flavors,
            },
            model_json: serde_json::to_vec_pretty(model)?,
        })
    }

    /// `(relative path, contents)` for every file in the artifact directory.
    pub fn files(&self) -> Result<Vec<(String, Vec<u8>)>, MlError> {
        let descriptor = serde_yaml::to_string(&self.descriptor)?;
        Ok(vec![
            (DESCRIPTOR_FILE.to_string(), descriptor.into_bytes()),
            (MODEL_DATA_FILE.to_string(), self.model_json.clone()),
        ])
    }

    /// Descriptor as JSON, the form tracking servers record in run history.
    pub fn descriptor_json(&self) -> Result<String, MlError> {
        Ok(serde_json::to_string(&self.descriptor)?)
    }

    /// Reload the model from its serialized data.
    pub fn load_model(&self) -> Result<LinearRegression, MlError> {
        Ok(serde_json::from_slice(&self.model_json)?)
    }
}
