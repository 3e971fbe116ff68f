//! Experiment-tracking client abstraction.
//!
//! [`TrackingBackend`] is the seam between the smoke-test runner and the
//! tracking server. [`MlflowClient`] speaks the MLflow REST API over HTTP;
//! [`InMemoryTracker`] records everything locally and can be told to fail.

pub mod memory;
pub mod mlflow;

pub use memory::{InMemoryTracker, Operation, RecordedRun};
pub use mlflow::MlflowClient;

use crate::error::TrackingError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

/// Tag holding the display name of a run.
pub const TAG_RUN_NAME: &str = "mlflow.runName";
/// Tag holding the identity that created a run.
pub const TAG_USER: &str = "mlflow.user";
pub const TAG_SOURCE_NAME: &str = "mlflow.source.name";
pub const TAG_SOURCE_TYPE: &str = "mlflow.source.type";

/// Experiment lifecycle as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    #[default]
    Active,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    #[serde(default)]
    pub artifact_location: Option<String>,
    #[serde(default)]
    pub lifecycle_stage: LifecycleStage,
}

/// Run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Killed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    #[serde(default)]
    pub run_name: Option<String>,
    pub status: RunStatus,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub start_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub artifact_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTag {
    pub key: String,
    pub value: String,
}

impl RunTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    pub timestamp: i64,
    pub step: i64,
}

impl Metric {
    /// Metric at step 0, stamped with the current time.
    pub fn now(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp: chrono::Utc::now().timestamp_millis(),
            step: 0,
        }
    }
}

/// Parameters of a new run.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRun {
    pub experiment_id: String,
    pub run_name: String,
    pub start_time: i64,
    pub tags: Vec<RunTag>,
}

/// Operations a tracking server must support for the smoke test.
#[async_trait]
pub trait TrackingBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// `Ok(None)` when no experiment has this name.
    async fn get_experiment_by_name(&self, name: &str)
    -> Result<Option<Experiment>, TrackingError>;

    /// Returns the new experiment id.
    async fn create_experiment(&self, name: &str) -> Result<String, TrackingError>;

    async fn create_run(&self, request: &CreateRun) -> Result<RunInfo, TrackingError>;

    async fn log_param(&self, run_id: &str, param: &Param) -> Result<(), TrackingError>;

    async fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<(), TrackingError>;

    /// Store `contents` at `path`, relative to the run's artifact root.
    async fn log_artifact(
        &self,
        run: &RunInfo,
        path: &str,
        contents: Vec<u8>,
    ) -> Result<(), TrackingError>;

    /// Record a logged model's descriptor against the run.
    async fn log_model(&self, run_id: &str, model_json: &str) -> Result<(), TrackingError>;

    /// Set the run's status and end time.
    async fn update_run(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: i64,
    ) -> Result<RunInfo, TrackingError>;

    /// Select an experiment by name, creating it if absent. A deleted
    /// experiment is an error and is left untouched. Returns the experiment id.
    async fn ensure_experiment(&self, name: &str) -> Result<String, TrackingError> {
        match self.get_experiment_by_name(name).await? {
            Some(exp) if exp.lifecycle_stage == LifecycleStage::Deleted => {
                Err(TrackingError::ExperimentDeleted {
                    name: name.to_string(),
                    experiment_id: exp.experiment_id,
                })
            }
            Some(exp) => Ok(exp.experiment_id),
            None => {
                let id = self.create_experiment(name).await?;
                tracing::info!(experiment = %name, id = %id, "Created experiment");
                Ok(id)
            }
        }
    }
}

/// Servers encode int64 fields either as JSON numbers or as strings.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(v)) => Ok(Some(v)),
        Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
