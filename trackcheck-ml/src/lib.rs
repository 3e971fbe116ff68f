//! # trackcheck-ml
//!
//! The model side of the tracking smoke test: a fixed training set, an
//! ordinary least squares linear regression, regression metrics, and the
//! serialized artifact form the fitted model is uploaded in.

pub mod artifact;
pub mod dataset;
pub mod error;
pub mod linear;
pub mod metrics;

pub use artifact::ModelArtifact;
pub use dataset::Dataset;
pub use error::MlError;
pub use linear::LinearRegression;
