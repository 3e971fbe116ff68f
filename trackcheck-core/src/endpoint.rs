//! Tracking server endpoint.

use std::fmt;

const SCHEME: &str = "http://";

/// Base URI of a tracking server, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    uri: String,
}

impl Endpoint {
    /// Compose `http://<host>` verbatim; the host is not parsed or normalised.
    pub fn from_host(host: &str) -> Self {
        Self {
            uri: format!("{SCHEME}{host}"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// Append an absolute REST path such as `/api/2.0/mlflow/runs/create`.
    pub fn join(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.uri.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}
