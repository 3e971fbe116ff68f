//! Scoped tracking runs.
//!
//! A run moves through three states: unopened, open, finalized. [`ActiveRun`]
//! is the open state; [`ActiveRun::finish`] consumes it, so a run cannot be
//! finalized twice. [`ActiveRun::scoped`] ties the whole lifecycle to a body
//! future and finalizes on both the success and the error path.

use crate::error::{TrackcheckError, TrackingError};
use crate::tracking::{CreateRun, Metric, Param, RunInfo, RunStatus, RunTag, TrackingBackend};
use chrono::Utc;
use std::sync::Arc;
use trackcheck_ml::ModelArtifact;

/// Write access to an open run. Only lent out by [`ActiveRun`], so nothing
/// can log to the run once it is finalized.
pub struct RunHandle {
    backend: Arc<dyn TrackingBackend>,
    info: RunInfo,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    pub async fn log_param(&self, key: &str, value: impl ToString) -> Result<(), TrackingError> {
        let param = Param {
            key: key.to_string(),
            value: value.to_string(),
        };
        tracing::info!(run_id = %self.info.run_id, key, value = %param.value, "Logging param");
        self.backend.log_param(&self.info.run_id, &param).await
    }

    pub async fn log_metric(&self, key: &str, value: f64) -> Result<(), TrackingError> {
        tracing::info!(run_id = %self.info.run_id, key, value, "Logging metric");
        self.backend
            .log_metric(&self.info.run_id, &Metric::now(key, value))
            .await
    }

    /// Upload every file of `artifact` under its artifact path, then record
    /// the model against the run.
    pub async fn log_model(&self, artifact: &ModelArtifact) -> Result<(), TrackcheckError> {
        let root = artifact.descriptor.artifact_path.trim_matches('/');
        for (name, contents) in artifact.files()? {
            let path = format!("{root}/{name}");
            tracing::debug!(
                run_id = %self.info.run_id,
                path = %path,
                bytes = contents.len(),
                "Uploading artifact"
            );
            self.backend.log_artifact(&self.info, &path, contents).await?;
        }
        self.backend
            .log_model(&self.info.run_id, &artifact.descriptor_json()?)
            .await?;
        tracing::info!(run_id = %self.info.run_id, artifact_path = root, "Logged model");
        Ok(())
    }
}

/// An open run that must be finalized.
pub struct ActiveRun {
    handle: RunHandle,
    finalized: bool,
}

impl ActiveRun {
    /// Create the run on the backend.
    pub async fn start(
        backend: Arc<dyn TrackingBackend>,
        experiment_id: &str,
        run_name: &str,
        tags: Vec<RunTag>,
    ) -> Result<Self, TrackingError> {
        let request = CreateRun {
            experiment_id: experiment_id.to_string(),
            run_name: run_name.to_string(),
            start_time: Utc::now().timestamp_millis(),
            tags,
        };
        let info = backend.create_run(&request).await?;
        tracing::info!(
            run_id = %info.run_id,
            experiment_id,
            run_name,
            backend = backend.name(),
            "Started run"
        );
        Ok(Self {
            handle: RunHandle { backend, info },
            finalized: false,
        })
    }

    pub fn handle(&self) -> &RunHandle {
        &self.handle
    }

    pub fn run_id(&self) -> &str {
        self.handle.run_id()
    }

    /// Set the terminal status and end time. Consumes the run.
    pub async fn finish(mut self, status: RunStatus) -> Result<RunInfo, TrackingError> {
        // Marked before the call: a failed update is reported, not retried.
        self.finalized = true;
        let info = self
            .handle
            .backend
            .update_run(
                &self.handle.info.run_id,
                status,
                Utc::now().timestamp_millis(),
            )
            .await?;
        tracing::info!(run_id = %info.run_id, status = ?info.status, "Finalized run");
        Ok(info)
    }

    /// Run `body` inside a fresh run and always finalize it: `FINISHED` when
    /// the body succeeds, `FAILED` when it returns an error. A body error is
    /// returned in preference to a finalize error.
    ///
    /// The body only borrows the [`RunHandle`], so it cannot outlive the run:
    ///
    /// ```compile_fail
    /// # use std::sync::Arc;
    /// # use trackcheck_core::{ActiveRun, InMemoryTracker, RunHandle, TrackcheckError};
    /// # async fn leak(backend: Arc<InMemoryTracker>) {
    /// let leaked = ActiveRun::scoped(backend, "0", "r", Vec::new(), async |run: &RunHandle| {
    ///     Ok::<_, TrackcheckError>(run)
    /// })
    /// .await;
    /// # }
    /// ```
    pub async fn scoped<T, E, F>(
        backend: Arc<dyn TrackingBackend>,
        experiment_id: &str,
        run_name: &str,
        tags: Vec<RunTag>,
        body: F,
    ) -> Result<(T, RunInfo), E>
    where
        F: AsyncFnOnce(&RunHandle) -> Result<T, E>,
        E: From<TrackingError> + std::fmt::Display,
    {
        let run = Self::start(backend, experiment_id, run_name, tags).await?;
        let outcome = body(&run.handle).await;
        let status = if outcome.is_ok() {
            RunStatus::Finished
        } else {
            RunStatus::Failed
        };
        let run_id = run.run_id().to_string();
        let finished = run.finish(status).await;

        match (outcome, finished) {
            (Ok(value), Ok(info)) => Ok((value, info)),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(_)) => {
                tracing::error!(run_id = %run_id, error = %err, "Run failed");
                Err(err)
            }
            (Err(err), Err(finalize_err)) => {
                tracing::error!(run_id = %run_id, error = %err, "Run failed");
                tracing::warn!(
                    run_id = %run_id,
                    error = %finalize_err,
                    "Could not mark run as failed"
                );
                Err(err)
            }
        }
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if !self.finalized {
            tracing::warn!(
                run_id = %self.handle.info.run_id,
                "Run dropped without being finalized; it stays RUNNING on the server"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{InMemoryTracker, Operation};
    use trackcheck_ml::{Dataset, LinearRegression};

    async fn setup(tracker: InMemoryTracker) -> (Arc<InMemoryTracker>, String) {
        let tracker = Arc::new(tracker);
        let exp = tracker.ensure_experiment("infra-test").await.unwrap();
        (tracker, exp)
    }

    #[tokio::test]
    async fn test_scoped_success_finishes_run() {
        let (tracker, exp) = setup(InMemoryTracker::new()).await;
        let (value, info) = ActiveRun::scoped(
            tracker.clone(),
            &exp,
            "hello-mlflow",
            Vec::new(),
            async |run: &RunHandle| {
                run.log_metric("mse", 0.0).await?;
                Ok::<_, TrackcheckError>(42)
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(info.status, RunStatus::Finished);
        let runs = tracker.runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].info.status, RunStatus::Finished);
        assert!(runs[0].info.end_time.is_some());
        assert_eq!(runs[0].metric("mse"), Some(0.0));
    }

    #[tokio::test]
    async fn test_scoped_failure_still_finalizes() {
        let (tracker, exp) = setup(InMemoryTracker::failing_on(Operation::LogMetric)).await;
        let err = ActiveRun::scoped(
            tracker.clone(),
            &exp,
            "hello-mlflow",
            Vec::new(),
            async |run: &RunHandle| {
                run.log_metric("mse", 0.0).await?;
                run.log_param("never", true).await?;
                Ok::<_, TrackcheckError>(())
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            TrackcheckError::Tracking(TrackingError::Injected { .. })
        ));
        let runs = tracker.runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].info.status, RunStatus::Failed);
        assert!(runs[0].params.is_empty());
        assert_eq!(tracker.calls().await.last(), Some(&Operation::UpdateRun));
    }

    #[tokio::test]
    async fn test_scoped_reports_finalize_error() {
        let (tracker, exp) = setup(InMemoryTracker::failing_on(Operation::UpdateRun)).await;
        let err = ActiveRun::scoped(
            tracker.clone(),
            &exp,
            "r",
            Vec::new(),
            async |_run: &RunHandle| Ok::<_, TrackcheckError>(()),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            TrackcheckError::Tracking(TrackingError::Injected { ref operation }) if operation == "update_run"
        ));
    }

    #[tokio::test]
    async fn test_create_failure_opens_nothing() {
        let (tracker, exp) = setup(InMemoryTracker::failing_on(Operation::CreateRun)).await;
        let result = ActiveRun::scoped(
            tracker.clone(),
            &exp,
            "r",
            Vec::new(),
            async |_run: &RunHandle| Ok::<_, TrackcheckError>(()),
        )
        .await;
        assert!(result.is_err());
        assert!(tracker.runs().await.is_empty());
        assert!(!tracker.calls().await.contains(&Operation::UpdateRun));
    }

    #[tokio::test]
    async fn test_log_model_uploads_files() {
        let (tracker, exp) = setup(InMemoryTracker::new()).await;
        let run = ActiveRun::start(tracker.clone(), &exp, "r", Vec::new())
            .await
            .unwrap();

        let data = Dataset::smoke();
        let mut model = LinearRegression::new();
        model.fit(&data.features, &data.targets).unwrap();
        let artifact = ModelArtifact::from_model(&model, "model", run.run_id()).unwrap();
        run.handle().log_model(&artifact).await.unwrap();

        let run_id = run.run_id().to_string();
        run.finish(RunStatus::Finished).await.unwrap();

        let recorded = tracker.run(&run_id).await.unwrap();
        let paths: Vec<&str> = recorded.artifacts.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["model/MLmodel", "model/model.json"]);
        assert_eq!(recorded.logged_models.len(), 1);
    }
}
