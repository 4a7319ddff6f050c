//! Runner error types.

use conflict::ConflictError;
use saga::SagaError;
use thiserror::Error;

/// Errors that stop the runner before or while it submits sagas.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// An environment variable held a value the runner refuses to guess at.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Saga error: {0}")]
    Saga(#[from] SagaError),

    #[error("Conflict error: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The Prometheus recorder could not be installed.
    #[error("Metrics error: {0}")]
    Metrics(String),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
