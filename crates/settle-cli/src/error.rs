//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Settle(#[from] settle_common::Error),

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("logging error: {0}")]
    Telemetry(#[from] settle_common::telemetry::TelemetryError),

    #[error("failed to read kubeconfig {path}: {message}")]
    Kubeconfig { path: PathBuf, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{failed} of {total} scenario steps failed")]
    ScenarioFailed { failed: usize, total: usize },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }
}
