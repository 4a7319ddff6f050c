use thiserror::Error;

use crate::{RecordId, Version};

/// Errors that can occur when interacting with a state registry.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// The record does not exist in this registry partition.
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    /// A record with the same id already exists.
    #[error("Record already exists: {0}")]
    AlreadyExists(RecordId),

    /// A forced write tried to move a record's version backwards.
    #[error("Version regression for record {record_id}: current {current}, requested {requested}")]
    VersionRegression {
        record_id: RecordId,
        current: Version,
        requested: Version,
    },

    /// A stored payload was not a JSON object.
    #[error("Invalid payload for record {0}: expected a JSON object")]
    InvalidPayload(RecordId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for state registry operations.
pub type Result<T> = std::result::Result<T, StateStoreError>;
