//! In-process tracking backend.
//!
//! Keeps experiments and runs in memory, enforces that only `RUNNING` runs
//! accept writes, and can be told to fail a given operation.

use super::{
    CreateRun, Experiment, LifecycleStage, Metric, Param, RunInfo, RunStatus, RunTag,
    TrackingBackend,
};
use crate::error::TrackingError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::Mutex;

/// Backend operations, used to inject failures and inspect the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetExperiment,
    CreateExperiment,
    CreateRun,
    LogParam,
    LogMetric,
    LogArtifact,
    LogModel,
    UpdateRun,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GetExperiment => "get_experiment",
            Self::CreateExperiment => "create_experiment",
            Self::CreateRun => "create_run",
            Self::LogParam => "log_param",
            Self::LogMetric => "log_metric",
            Self::LogArtifact => "log_artifact",
            Self::LogModel => "log_model",
            Self::UpdateRun => "update_run",
        };
        f.write_str(name)
    }
}

/// Everything recorded against one run.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub info: RunInfo,
    pub tags: Vec<RunTag>,
    pub params: Vec<Param>,
    pub metrics: Vec<Metric>,
    pub artifacts: BTreeMap<String, Vec<u8>>,
    pub logged_models: Vec<String>,
}

impl RecordedRun {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Latest value logged for `key`.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics
            .iter()
            .rev()
            .find(|m| m.key == key)
            .map(|m| m.value)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

#[derive(Debug, Default)]
struct State {
    experiments: Vec<Experiment>,
    runs: Vec<RecordedRun>,
    calls: Vec<Operation>,
    fail_on: Option<Operation>,
}

impl State {
    fn enter(&mut self, op: Operation) -> Result<(), TrackingError> {
        self.calls.push(op);
        if self.fail_on == Some(op) {
            return Err(TrackingError::Injected {
                operation: op.to_string(),
            });
        }
        Ok(())
    }

    fn run_mut(&mut self, run_id: &str) -> Result<&mut RecordedRun, TrackingError> {
        self.runs
            .iter_mut()
            .find(|r| r.info.run_id == run_id)
            .ok_or_else(|| TrackingError::NotFound {
                what: format!("run {run_id}"),
            })
    }

    fn active_run_mut(&mut self, run_id: &str) -> Result<&mut RecordedRun, TrackingError> {
        let run = self.run_mut(run_id)?;
        if run.info.status != RunStatus::Running {
            return Err(TrackingError::RunNotActive {
                run_id: run_id.to_string(),
            });
        }
        Ok(run)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTracker {
    state: Mutex<State>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `op` fail with [`TrackingError::Injected`].
    pub fn failing_on(op: Operation) -> Self {
        Self {
            state: Mutex::new(State {
                fail_on: Some(op),
                ..State::default()
            }),
        }
    }

    /// Seed an experiment, e.g. one in the deleted stage.
    pub async fn insert_experiment(&self, experiment: Experiment) {
        self.state.lock().await.experiments.push(experiment);
    }

    pub async fn experiments(&self) -> Vec<Experiment> {
        self.state.lock().await.experiments.clone()
    }

    pub async fn runs(&self) -> Vec<RecordedRun> {
        self.state.lock().await.runs.clone()
    }

    pub async fn run(&self, run_id: &str) -> Option<RecordedRun> {
        self.state
            .lock()
            .await
            .runs
            .iter()
            .find(|r| r.info.run_id == run_id)
            .cloned()
    }

    /// Operations invoked so far, in order.
    pub async fn calls(&self) -> Vec<Operation> {
        self.state.lock().await.calls.clone()
    }
}

#[async_trait]
impl TrackingBackend for InMemoryTracker {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_experiment_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Experiment>, TrackingError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::GetExperiment)?;
        Ok(state.experiments.iter().find(|e| e.name == name).cloned())
    }

    async fn create_experiment(&self, name: &str) -> Result<String, TrackingError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::CreateExperiment)?;
        if state.experiments.iter().any(|e| e.name == name) {
            return Err(TrackingError::Rejected {
                operation: Operation::CreateExperiment.to_string(),
                status: 400,
                error_code: "RESOURCE_ALREADY_EXISTS".to_string(),
                message: format!("Experiment '{name}' already exists"),
            });
        }
        let id = state.experiments.len().to_string();
        state.experiments.push(Experiment {
            experiment_id: id.clone(),
            name: name.to_string(),
            artifact_location: Some(format!("mlflow-artifacts:/{id}")),
            lifecycle_stage: LifecycleStage::Active,
        });
        Ok(id)
    }

    async fn create_run(&self, request: &CreateRun) -> Result<RunInfo, TrackingError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::CreateRun)?;
        let experiment = state
            .experiments
            .iter()
            .find(|e| e.experiment_id == request.experiment_id)
            .ok_or_else(|| TrackingError::NotFound {
                what: format!("experiment {}", request.experiment_id),
            })?;
        if experiment.lifecycle_stage == LifecycleStage::Deleted {
            return Err(TrackingError::Rejected {
                operation: Operation::CreateRun.to_string(),
                status: 400,
                error_code: "INVALID_STATE".to_string(),
                message: format!("Experiment {} is deleted", request.experiment_id),
            });
        }

        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let info = RunInfo {
            artifact_uri: Some(format!(
                "mlflow-artifacts:/{}/{run_id}/artifacts",
                request.experiment_id
            )),
            run_id,
            experiment_id: request.experiment_id.clone(),
            run_name: Some(request.run_name.clone()),
            status: RunStatus::Running,
            start_time: Some(request.start_time),
            end_time: None,
        };
        state.runs.push(RecordedRun {
            info: info.clone(),
            tags: request.tags.clone(),
            params: Vec::new(),
            metrics: Vec::new(),
            artifacts: BTreeMap::new(),
            logged_models: Vec::new(),
        });
        Ok(info)
    }

    async fn log_param(&self, run_id: &str, param: &Param) -> Result<(), TrackingError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::LogParam)?;
        state.active_run_mut(run_id)?.params.push(param.clone());
        Ok(())
    }

    async fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<(), TrackingError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::LogMetric)?;
        state.active_run_mut(run_id)?.metrics.push(metric.clone());
        Ok(())
    }

    async fn log_artifact(
        &self,
        run: &RunInfo,
        path: &str,
        contents: Vec<u8>,
    ) -> Result<(), TrackingError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::LogArtifact)?;
        state
            .active_run_mut(&run.run_id)?
            .artifacts
            .insert(path.to_string(), contents);
        Ok(())
    }

    async fn log_model(&self, run_id: &str, model_json: &str) -> Result<(), TrackingError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::LogModel)?;
        state
            .active_run_mut(run_id)?
            .logged_models
            .push(model_json.to_string());
        Ok(())
    }

    async fn update_run(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: i64,
    ) -> Result<RunInfo, TrackingError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::UpdateRun)?;
        let run = state.run_mut(run_id)?;
        run.info.status = status;
        if status.is_terminal() {
            run.info.end_time = Some(end_time);
        }
        Ok(run.info.clone())
    }
}
