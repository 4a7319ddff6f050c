//! Saga error types.

use conflict::ConflictError;
use state_store::StateStoreError;
use thiserror::Error;

/// Errors that can occur during saga operations.
///
/// Only `Configuration` ever reaches a caller of `submit`; every other
/// variant describes a step or compensation failure and ends up as text in
/// the saga outcome and journal.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Unregistered transaction type, unknown domain, invalid definition
    /// or invalid policy name.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A step's execute action failed.
    #[error("Saga step '{step}' failed: {reason}")]
    StepExecution { step: String, reason: String },

    /// A step's compensating action failed.
    #[error("Compensation step '{step}' failed: {reason}")]
    Compensation { step: String, reason: String },

    /// A step or compensation did not finish within the step timeout.
    #[error("Saga step '{step}' timed out after {timeout_ms}ms")]
    Timeout { step: String, timeout_ms: u128 },

    /// The submission was cancelled before the step finished.
    #[error("Saga step '{step}' cancelled")]
    Cancelled { step: String },

    /// A fault was injected at this step.
    #[error("Injected fault at saga step '{step}'")]
    InjectedFault { step: String },

    /// State registry error raised inside a step.
    #[error("State store error: {0}")]
    Store(#[from] StateStoreError),

    /// Conflict handling error raised inside a step.
    #[error("Conflict error: {0}")]
    Conflict(#[from] ConflictError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
