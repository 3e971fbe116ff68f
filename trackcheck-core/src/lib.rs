//! # trackcheck-core
//!
//! Client side of the tracking smoke test: configuration, the tracking
//! backend abstraction with its MLflow REST implementation, scoped runs, and
//! [`SmokeTestRunner`], which ties them to the model from `trackcheck-ml`.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod run;
pub mod runner;
pub mod tracking;

pub use config::{TrackcheckConfig, load_config};
pub use endpoint::Endpoint;
pub use error::{ConfigError, TrackcheckError, TrackingError};
pub use run::{ActiveRun, RunHandle};
pub use runner::{SmokeReport, SmokeTestRunner};
pub use tracking::{InMemoryTracker, MlflowClient, TrackingBackend};
