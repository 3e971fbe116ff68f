//! Error types for the trackcheck core library.
//!
//! Uses `thiserror` for structured variants covering tracking-server
//! interaction, configuration, and model fitting.

use std::path::PathBuf;
use trackcheck_ml::MlError;

/// Top-level error type for a smoke-test run.
#[derive(Debug, thiserror::Error)]
pub enum TrackcheckError {
    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Model error: {0}")]
    Model(#[from] MlError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from tracking-server interactions.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("Tracking server unreachable at {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Tracking server rejected {operation} ({status}, {error_code}): {message}")]
    Rejected {
        operation: String,
        status: u16,
        error_code: String,
        message: String,
    },

    #[error("Tracking server response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Cannot upload artifacts to '{uri}': only mlflow-artifacts URIs are supported")]
    UnsupportedArtifactUri { uri: String },

    #[error("Experiment '{name}' ({experiment_id}) is deleted; restore it on the server first")]
    ExperimentDeleted { name: String, experiment_id: String },

    #[error("Run {run_id} is not active")]
    RunNotActive { run_id: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Injected failure in {operation}")]
    Injected { operation: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Invalid {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackcheckError::Tracking(TrackingError::Rejected {
            operation: "log-metric".into(),
            status: 400,
            error_code: "INVALID_PARAMETER_VALUE".into(),
            message: "bad key".into(),
        });
        assert_eq!(
            err.to_string(),
            "Tracking error: Tracking server rejected log-metric (400, INVALID_PARAMETER_VALUE): bad key"
        );
    }

    #[test]
    fn test_error_from_ml() {
        let err: TrackcheckError = MlError::numerical("singular").into();
        assert!(matches!(err, TrackcheckError::Model(MlError::Numerical(_))));
    }

    #[test]
    fn test_experiment_deleted_display() {
        let err = TrackingError::ExperimentDeleted {
            name: "infra-test".into(),
            experiment_id: "7".into(),
        };
        assert_eq!(
            err.to_string(),
            "Experiment 'infra-test' (7) is deleted; restore it on the server first"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::FileNotFound {
            path: PathBuf::from("/tmp/missing.toml"),
        };
        assert!(err.to_string().contains("/tmp/missing.toml"));
    }
}
