//! Pure conflict resolution.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use state_store::{DataRecord, Payload, Version};

use crate::error::Result;
use crate::operation::UpdateOperation;
use crate::strategy::ConflictStrategy;

/// A field both writers touched with different values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub current: Value,
    pub incoming: Value,
}

/// The state a conflict resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// False only for `manual`.
    pub success: bool,

    /// Payload to store.
    pub resolved_data: Payload,

    /// Strategy that produced this resolution.
    pub strategy: ConflictStrategy,

    /// Version the record should end at. Equal to the current version when
    /// nothing needs to be written.
    pub new_version: Version,

    /// False when a human must still decide.
    pub resolved: bool,

    /// Per-field audit trail, filled by `merge`.
    pub field_conflicts: Vec<FieldConflict>,
}

impl ConflictResolution {
    /// Returns true if committing this resolution changes the record.
    pub fn requires_write(&self, current_version: Version) -> bool {
        self.resolved && self.new_version > current_version
    }
}

/// Resolves `update` against the stored `current` record.
///
/// Pure: neither argument is modified and no I/O happens.
pub fn resolve(
    current: &DataRecord,
    update: &UpdateOperation,
    strategy: ConflictStrategy,
) -> ConflictResolution {
    match strategy {
        ConflictStrategy::LastWriteWins => ConflictResolution {
            success: true,
            resolved_data: overlay(&current.payload, &update.field_changes),
            strategy,
            new_version: current.version.next(),
            resolved: true,
            field_conflicts: Vec::new(),
        },
        ConflictStrategy::FirstWriteWins => ConflictResolution {
            success: true,
            resolved_data: current.payload.clone(),
            strategy,
            new_version: current.version,
            resolved: true,
            field_conflicts: Vec::new(),
        },
        ConflictStrategy::Merge => {
            let field_conflicts = update
                .field_changes
                .iter()
                .filter_map(|(field, incoming)| {
                    current
                        .payload
                        .get(field)
                        .filter(|existing| *existing != incoming)
                        .map(|existing| FieldConflict {
                            field: field.clone(),
                            current: existing.clone(),
                            incoming: incoming.clone(),
                        })
                })
                .collect();

            ConflictResolution {
                success: true,
                resolved_data: overlay(&current.payload, &update.field_changes),
                strategy,
                new_version: current.version.next(),
                resolved: true,
                field_conflicts,
            }
        }
        ConflictStrategy::Manual => ConflictResolution {
            success: false,
            resolved_data: current.payload.clone(),
            strategy,
            new_version: current.version,
            resolved: false,
            field_conflicts: Vec::new(),
        },
    }
}

/// Resolves using a strategy given by name.
///
/// An unknown name is a configuration error; there is no fallback strategy.
pub fn resolve_named(
    current: &DataRecord,
    update: &UpdateOperation,
    strategy: &str,
) -> Result<ConflictResolution> {
    let strategy = strategy.parse::<ConflictStrategy>()?;
    Ok(resolve(current, update, strategy))
}

fn overlay(base: &Payload, changes: &Payload) -> Payload {
    let mut merged = base.clone();
    for (field, value) in changes {
        merged.insert(field.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConflictError;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn record(value: Value, version: i64) -> DataRecord {
        let mut record = DataRecord::new("r1", payload(value), "owner");
        record.version = Version::new(version);
        record
    }

    fn update(value: Value, expected: i64) -> UpdateOperation {
        UpdateOperation::new("r1", "late-writer", payload(value), Version::new(expected))
    }

    #[test]
    fn test_last_write_wins_overlays_changes() {
        let current = record(json!({"a": 2}), 2);
        let resolution = resolve(
            &current,
            &update(json!({"b": 3}), 1),
            ConflictStrategy::LastWriteWins,
        );

        assert!(resolution.success);
        assert!(resolution.resolved);
        assert_eq!(resolution.resolved_data, payload(json!({"a": 2, "b": 3})));
        assert_eq!(resolution.new_version, Version::new(3));
    }

    #[test]
    fn test_last_write_wins_overwrites_shared_field() {
        let current = record(json!({"a": 2, "c": 0}), 4);
        let resolution = resolve(
            &current,
            &update(json!({"a": 9}), 3),
            ConflictStrategy::LastWriteWins,
        );

        assert_eq!(resolution.resolved_data, payload(json!({"a": 9, "c": 0})));
        assert_eq!(resolution.new_version, Version::new(5));
    }

    #[test]
    fn test_first_write_wins_keeps_current() {
        let current = record(json!({"a": 2}), 2);
        let resolution = resolve(
            &current,
            &update(json!({"a": 7, "b": 3}), 1),
            ConflictStrategy::FirstWriteWins,
        );

        assert!(resolution.success);
        assert!(resolution.resolved);
        assert_eq!(resolution.resolved_data, current.payload);
        assert_eq!(resolution.new_version, Version::new(2));
        assert!(!resolution.requires_write(current.version));
    }

    #[test]
    fn test_merge_disjoint_fields_is_union() {
        let current = record(json!({"a": 1, "b": 2}), 3);
        let resolution = resolve(
            &current,
            &update(json!({"c": 3, "d": 4}), 2),
            ConflictStrategy::Merge,
        );

        assert_eq!(
            resolution.resolved_data,
            payload(json!({"a": 1, "b": 2, "c": 3, "d": 4}))
        );
        assert!(resolution.field_conflicts.is_empty());
        assert_eq!(resolution.new_version, Version::new(4));
    }

    #[test]
    fn test_merge_reports_differing_fields() {
        let current = record(json!({"price": 100, "status": "draft"}), 2);
        let resolution = resolve(
            &current,
            &update(json!({"price": 120, "status": "draft", "tag": "hot"}), 1),
            ConflictStrategy::Merge,
        );

        assert_eq!(
            resolution.resolved_data,
            payload(json!({"price": 120, "status": "draft", "tag": "hot"}))
        );
        assert_eq!(
            resolution.field_conflicts,
            vec![FieldConflict {
                field: "price".to_string(),
                current: json!(100),
                incoming: json!(120),
            }]
        );
    }

    #[test]
    fn test_manual_leaves_state_unresolved() {
        let current = record(json!({"a": 2}), 2);
        let resolution = resolve(&current, &update(json!({"a": 5}), 1), ConflictStrategy::Manual);

        assert!(!resolution.success);
        assert!(!resolution.resolved);
        assert_eq!(resolution.resolved_data, current.payload);
        assert_eq!(resolution.new_version, current.version);
        assert!(!resolution.requires_write(current.version));
    }

    #[test]
    fn test_resolve_does_not_mutate_inputs() {
        let current = record(json!({"a": 2}), 2);
        let op = update(json!({"a": 3}), 1);
        let before = (current.clone(), op.clone());

        for strategy in ConflictStrategy::ALL {
            let _ = resolve(&current, &op, strategy);
        }

        assert_eq!((current, op), before);
    }

    #[test]
    fn test_resolve_named_unknown_strategy() {
        let current = record(json!({}), 1);
        let result = resolve_named(&current, &update(json!({}), 1), "coin-flip");
        assert!(matches!(result, Err(ConflictError::Configuration(_))));
    }

    #[test]
    fn test_resolve_named_known_strategy() {
        let current = record(json!({"a": 1}), 1);
        let resolution = resolve_named(&current, &update(json!({"b": 2}), 0), "merge").unwrap();
        assert_eq!(resolution.strategy, ConflictStrategy::Merge);
    }
}
