//! MLflow REST API client (`/api/2.0/mlflow/...`).
//!
//! Artifacts are uploaded through the server's artifact proxy
//! (`/api/2.0/mlflow-artifacts/artifacts/...`), which is what runs get when the
//! server is started with `--serve-artifacts`.

use super::{CreateRun, Experiment, Metric, Param, RunInfo, RunStatus, TrackingBackend};
use crate::endpoint::Endpoint;
use crate::error::TrackingError;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

const API_PREFIX: &str = "/api/2.0/mlflow";
const ARTIFACT_PREFIX: &str = "/api/2.0/mlflow-artifacts/artifacts";
const ARTIFACT_SCHEME: &str = "mlflow-artifacts:";

/// Error body returned by MLflow on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetExperimentResponse {
    experiment: Experiment,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct CreateRunResponse {
    run: RunEnvelope,
}

#[derive(Debug, Deserialize)]
struct UpdateRunResponse {
    run_info: RunInfo,
}

pub struct MlflowClient {
    endpoint: Endpoint,
    http: reqwest::Client,
}

impl MlflowClient {
    /// Client with reqwest's default connection and timeout policy.
    pub fn new(endpoint: Endpoint) -> Result<Self, TrackingError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("trackcheck/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { endpoint, http })
    }

    fn api_url(&self, method: &str) -> String {
        self.endpoint.join(&format!("{API_PREFIX}/{method}"))
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TrackingError> {
        tracing::debug!(operation, endpoint = %self.endpoint, "MLflow request");
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ErrorBody>(&text).ok();
        let (error_code, message) = match body {
            Some(b) => (
                b.error_code.unwrap_or_else(|| "UNKNOWN".to_string()),
                b.message.unwrap_or_else(|| text.clone()),
            ),
            None => ("UNKNOWN".to_string(), text),
        };
        Err(TrackingError::Rejected {
            operation: operation.to_string(),
            status: status.as_u16(),
            error_code,
            message,
        })
    }

    async fn post<R: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
    ) -> Result<R, TrackingError> {
        let request = self.http.post(self.api_url(method)).json(body);
        let response = self.send(method, request).await?;
        response
            .json()
            .await
            .map_err(|e| TrackingError::ResponseParse {
                message: format!("{method}: {e}"),
            })
    }

    /// POST whose response body carries nothing of interest.
    async fn post_unit(&self, method: &str, body: &Value) -> Result<(), TrackingError> {
        let request = self.http.post(self.api_url(method)).json(body);
        self.send(method, request).await?;
        Ok(())
    }

    fn transport_error(&self, err: reqwest::Error) -> TrackingError {
        if err.is_connect() || err.is_timeout() {
            TrackingError::Connection {
                endpoint: self.endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            TrackingError::Http(err)
        }
    }

    /// Proxy URL for a file under a run's `mlflow-artifacts:` root.
    fn artifact_url(&self, artifact_uri: &str, path: &str) -> Result<String, TrackingError> {
        let root = artifact_root(artifact_uri)?;
        let path = path.trim_start_matches('/');
        let full = if root.is_empty() {
            path.to_string()
        } else {
            format!("{root}/{path}")
        };
        Ok(self.endpoint.join(&format!("{ARTIFACT_PREFIX}/{full}")))
    }
}

/// Path portion of an `mlflow-artifacts:` URI, without surrounding slashes.
///
/// Accepts both `mlflow-artifacts:/1/abc/artifacts` and the authority form
/// `mlflow-artifacts://host:5000/1/abc/artifacts`.
fn artifact_root(artifact_uri: &str) -> Result<&str, TrackingError> {
    let rest = artifact_uri
        .strip_prefix(ARTIFACT_SCHEME)
        .ok_or_else(|| TrackingError::UnsupportedArtifactUri {
            uri: artifact_uri.to_string(),
        })?;
    let path = match rest.strip_prefix("//") {
        Some(authority_and_path) => authority_and_path
            .find('/')
            .map_or("", |i| &authority_and_path[i..]),
        None => rest,
    };
    Ok(path.trim_matches('/'))
}

#[async_trait]
impl TrackingBackend for MlflowClient {
    fn name(&self) -> &str {
        "mlflow"
    }

    async fn get_experiment_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Experiment>, TrackingError> {
        let request = self
            .http
            .get(self.api_url("experiments/get-by-name"))
            .query(&[("experiment_name", name)]);

        match self.send("experiments/get-by-name", request).await {
            Ok(response) => {
                let body: GetExperimentResponse =
                    response
                        .json()
                        .await
                        .map_err(|e| TrackingError::ResponseParse {
                            message: format!("experiments/get-by-name: {e}"),
                        })?;
                Ok(Some(body.experiment))
            }
            Err(TrackingError::Rejected { error_code, .. })
                if error_code == "RESOURCE_DOES_NOT_EXIST" =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_experiment(&self, name: &str) -> Result<String, TrackingError> {
        let body: CreateExperimentResponse =
            self.post("experiments/create", &json!({ "name": name })).await?;
        Ok(body.experiment_id)
    }

    async fn create_run(&self, request: &CreateRun) -> Result<RunInfo, TrackingError> {
        let body: CreateRunResponse = self
            .post(
                "runs/create",
                &json!({
                    "experiment_id": request.experiment_id,
                    "run_name": request.run_name,
                    "start_time": request.start_time,
                    "tags": request.tags,
                }),
            )
            .await?;
        Ok(body.run.info)
    }

    async fn log_param(&self, run_id: &str, param: &Param) -> Result<(), TrackingError> {
        self.post_unit(
            "runs/log-parameter",
            &json!({ "run_id": run_id, "key": param.key, "value": param.value }),
        )
        .await
    }

    async fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<(), TrackingError> {
        self.post_unit(
            "runs/log-metric",
            &json!({
                "run_id": run_id,
                "key": metric.key,
                "value": metric.value,
                "timestamp": metric.timestamp,
                "step": metric.step,
            }),
        )
        .await
    }

    async fn log_artifact(
        &self,
        run: &RunInfo,
        path: &str,
        contents: Vec<u8>,
    ) -> Result<(), TrackingError> {
        let artifact_uri = run
            .artifact_uri
            .as_deref()
            .ok_or_else(|| TrackingError::UnsupportedArtifactUri {
                uri: String::new(),
            })?;
        let url = self.artifact_url(artifact_uri, path)?;
        let request = self.http.put(url).body(contents);
        self.send("artifacts/upload", request).await?;
        Ok(())
    }

    async fn log_model(&self, run_id: &str, model_json: &str) -> Result<(), TrackingError> {
        self.post_unit(
            "runs/log-model",
            &json!({ "run_id": run_id, "model_json": model_json }),
        )
        .await
    }

    async fn update_run(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: i64,
    ) -> Result<RunInfo, TrackingError> {
        let body: UpdateRunResponse = self
            .post(
                "runs/update",
                &json!({ "run_id": run_id, "status": status, "end_time": end_time }),
            )
            .await?;
        Ok(body.run_info)
    }
}
