//! End-to-end smoke test against a tracking server.

use crate::config::TrackcheckConfig;
use crate::endpoint::Endpoint;
use crate::error::TrackcheckError;
use crate::run::{ActiveRun, RunHandle};
use crate::tracking::{
    MlflowClient, RunInfo, RunTag, TAG_RUN_NAME, TAG_SOURCE_NAME, TAG_SOURCE_TYPE, TAG_USER,
    TrackingBackend,
};
use std::sync::Arc;
use trackcheck_ml::{Dataset, LinearRegression, ModelArtifact, metrics};

pub const METRIC_MSE: &str = "mse";
pub const METRIC_R2: &str = "r2";
pub const PARAM_FIT_INTERCEPT: &str = "fit_intercept";

/// What the fitted model scored on its own training set.
#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    pub slope: f64,
    pub intercept: f64,
    pub fit_intercept: bool,
    pub mse: f64,
    pub r2: f64,
}

/// Outcome of a successful smoke test.
#[derive(Debug, Clone)]
pub struct SmokeReport {
    pub endpoint: Endpoint,
    pub experiment_id: String,
    pub run: RunInfo,
    pub fit: FitSummary,
    pub user: Option<String>,
}

impl SmokeReport {
    /// The single line printed on success.
    pub fn confirmation(&self) -> String {
        match &self.user {
            Some(user) => format!("Logged test run to {} as user {user}", self.endpoint),
            None => format!("Logged test run to {}", self.endpoint),
        }
    }
}

/// Fits a toy model and records it as one run on a tracking server.
pub struct SmokeTestRunner {
    config: TrackcheckConfig,
    endpoint: Endpoint,
    backend: Arc<dyn TrackingBackend>,
}

impl SmokeTestRunner {
    pub fn new(
        config: TrackcheckConfig,
        endpoint: Endpoint,
        backend: Arc<dyn TrackingBackend>,
    ) -> Self {
        Self {
            config,
            endpoint,
            backend,
        }
    }

    /// Runner talking MLflow REST to `http://<host>`.
    pub fn for_host(host: &str, config: TrackcheckConfig) -> Result<Self, TrackcheckError> {
        let endpoint = Endpoint::from_host(host);
        let backend = Arc::new(MlflowClient::new(endpoint.clone())?);
        Ok(Self::new(config, endpoint, backend))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn run_tags(&self) -> Vec<RunTag> {
        let tracking = &self.config.tracking;
        let mut tags = vec![
            RunTag::new(TAG_RUN_NAME, tracking.run_name.as_str()),
            RunTag::new(TAG_SOURCE_NAME, env!("CARGO_PKG_NAME")),
            RunTag::new(TAG_SOURCE_TYPE, "LOCAL"),
        ];
        if let Some(user) = &tracking.user {
            tags.push(RunTag::new(TAG_USER, user.as_str()));
        }
        tags
    }

    pub async fn run(&self) -> Result<SmokeReport, TrackcheckError> {
        let tracking = &self.config.tracking;
        tracing::info!(
            endpoint = %self.endpoint,
            experiment = %tracking.experiment_name,
            "Starting tracking smoke test"
        );

        let experiment_id = self
            .backend
            .ensure_experiment(&tracking.experiment_name)
            .await?;

        let fit_intercept = self.config.model.fit_intercept;
        let artifact_path = tracking.artifact_path.as_str();

        let (fit, run) = ActiveRun::scoped(
            self.backend.clone(),
            &experiment_id,
            &tracking.run_name,
            self.run_tags(),
            async |run: &RunHandle| {
                let data = Dataset::smoke();
                let mut model = LinearRegression::with_fit_intercept(fit_intercept);
                model.fit(&data.features, &data.targets)?;
                let preds = model.predict(&data.features)?;

                let mse = metrics::mean_squared_error(&data.targets, &preds)?;
                let r2 = model.score(&data.features, &data.targets)?;
                run.log_metric(METRIC_MSE, mse).await?;
                run.log_metric(METRIC_R2, r2).await?;

                run.log_param(PARAM_FIT_INTERCEPT, model.fit_intercept).await?;

                let artifact = ModelArtifact::from_model(&model, artifact_path, run.run_id())?;
                run.log_model(&artifact).await?;

                Ok::<_, TrackcheckError>(FitSummary {
                    slope: model
                        .coef
                        .as_ref()
                        .and_then(|c| c.first().copied())
                        .unwrap_or_default(),
                    intercept: model.intercept,
                    fit_intercept: model.fit_intercept,
                    mse,
                    r2,
                })
            },
        )
        .await?;

        Ok(SmokeReport {
            endpoint: self.endpoint.clone(),
            experiment_id,
            run,
            fit,
            user: tracking.user.clone(),
        })
    }
}
