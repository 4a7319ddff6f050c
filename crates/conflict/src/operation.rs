//! Update operations.

use chrono::{DateTime, Utc};
use common::{ActorId, RecordId};
use state_store::{Payload, Version};

/// A single versioned write request.
///
/// Constructed per call and discarded afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    /// The record to change.
    pub target_record_id: RecordId,

    /// Who is writing.
    pub actor: ActorId,

    /// Fields to set.
    pub field_changes: Payload,

    /// The version the writer last observed.
    pub expected_version: Version,

    /// When the write was requested.
    pub timestamp: DateTime<Utc>,
}

impl UpdateOperation {
    /// Creates a new update operation stamped with the current time.
    pub fn new(
        target_record_id: impl Into<RecordId>,
        actor: impl Into<ActorId>,
        field_changes: Payload,
        expected_version: Version,
    ) -> Self {
        Self {
            target_record_id: target_record_id.into(),
            actor: actor.into(),
            field_changes,
            expected_version,
            timestamp: Utc::now(),
        }
    }
}
