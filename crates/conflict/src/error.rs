//! Conflict handling error types.

use common::RecordId;
use state_store::StateStoreError;
use thiserror::Error;

/// Errors that can occur while updating or resolving records.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// Unknown strategy name or otherwise invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The resolution kept racing concurrent writers past the retry budget.
    #[error("Version conflict on record {record_id} outlasted {attempts} resolution attempts")]
    VersionConflict { record_id: RecordId, attempts: u32 },

    /// Underlying registry error (includes `NotFound`).
    #[error("State store error: {0}")]
    Store(#[from] StateStoreError),
}

impl ConflictError {
    /// Returns true if the target record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConflictError::Store(StateStoreError::NotFound(_)))
    }
}

/// Convenience type alias for conflict results.
pub type Result<T> = std::result::Result<T, ConflictError>;
