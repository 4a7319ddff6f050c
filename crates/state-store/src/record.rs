use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorId, RecordId};

/// Field-to-value mapping stored in a record.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Version number of a record, used for optimistic concurrency control.
///
/// Versions start at 1 when a record is created and increase by at least
/// one on every applied write.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version (1) assigned to a freshly created record.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A versioned record owned by one registry partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Record identifier, unique within its partition.
    pub id: RecordId,

    /// Current field values.
    pub payload: Payload,

    /// Current version.
    pub version: Version,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,

    /// Who wrote the record last.
    pub updated_by: ActorId,
}

impl DataRecord {
    /// Creates a record at the first version.
    pub fn new(id: impl Into<RecordId>, payload: Payload, actor: impl Into<ActorId>) -> Self {
        Self {
            id: id.into(),
            payload,
            version: Version::first(),
            updated_at: Utc::now(),
            updated_by: actor.into(),
        }
    }

    /// Returns the value of a payload field, if present.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.get(name)
    }
}

/// Outcome of a version-checked write.
///
/// When `has_conflict` is false the write was applied and `current_version`
/// is the record's new version. When it is true nothing was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetection {
    pub has_conflict: bool,
    pub current_version: Version,
    pub expected_version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicting_fields: Option<BTreeSet<String>>,
}

impl ConflictDetection {
    /// A successfully applied write that left the record at `current_version`.
    pub fn applied(current_version: Version, expected_version: Version) -> Self {
        Self {
            has_conflict: false,
            current_version,
            expected_version,
            conflicting_fields: None,
        }
    }

    /// A rejected write; `fields` are the names the caller tried to change.
    pub fn conflict<'a>(
        current_version: Version,
        expected_version: Version,
        fields: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        Self {
            has_conflict: true,
            current_version,
            expected_version,
            conflicting_fields: Some(fields.into_iter().cloned().collect()),
        }
    }
}
