//! Conflict-aware update API.

use chrono::Utc;
use common::{ActorId, RecordId};
use state_store::{ConflictDetection, DataRecord, Payload, StateRegistry, Version};

use crate::error::{ConflictError, Result};
use crate::operation::UpdateOperation;
use crate::resolver::{ConflictResolution, resolve};
use crate::review::{PendingReview, ReviewQueue};
use crate::strategy::ConflictStrategy;

/// Updater settings.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// How often a resolution is recomputed when another writer keeps
    /// moving the record underneath it.
    pub max_resolution_attempts: u32,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            max_resolution_attempts: 3,
        }
    }
}

/// What happened to a conflict-aware update.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// No conflict; the changes were applied directly.
    Applied { version: Version },

    /// A conflict was settled by an automatic strategy.
    AutoResolved {
        strategy: ConflictStrategy,
        resolution: ConflictResolution,
        /// The record the resolution was computed from and committed over.
        base: DataRecord,
        version: Version,
    },

    /// A `manual` conflict was escalated to the review queue; nothing was written.
    ManualConflictPending {
        detection: ConflictDetection,
        current: DataRecord,
    },
}

impl UpdateOutcome {
    /// The record's version after the call.
    pub fn version(&self) -> Version {
        match self {
            UpdateOutcome::Applied { version } | UpdateOutcome::AutoResolved { version, .. } => {
                *version
            }
            UpdateOutcome::ManualConflictPending { current, .. } => current.version,
        }
    }

    /// Returns true if a conflict was detected on the first attempt.
    pub fn had_conflict(&self) -> bool {
        !matches!(self, UpdateOutcome::Applied { .. })
    }
}

/// Performs versioned updates against a registry, resolving conflicts
/// before returning.
///
/// A raw version conflict is never surfaced: it ends as `Applied`,
/// `AutoResolved`, or `ManualConflictPending`.
pub struct ConflictAwareUpdater<R: StateRegistry> {
    registry: R,
    reviews: ReviewQueue,
    config: UpdaterConfig,
}

impl<R: StateRegistry> ConflictAwareUpdater<R> {
    /// Creates an updater with default settings and a fresh review queue.
    pub fn new(registry: R) -> Self {
        Self::with_config(registry, UpdaterConfig::default())
    }

    /// Creates an updater with explicit settings.
    pub fn with_config(registry: R, config: UpdaterConfig) -> Self {
        Self {
            registry,
            reviews: ReviewQueue::new(),
            config,
        }
    }

    /// Shares an existing review queue with this updater.
    pub fn with_review_queue(mut self, reviews: ReviewQueue) -> Self {
        self.reviews = reviews;
        self
    }

    /// Returns a reference to the underlying registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Returns the queue `manual` conflicts are escalated to.
    pub fn review_queue(&self) -> &ReviewQueue {
        &self.reviews
    }

    /// Applies `changes` if the record is at `expected_version`; otherwise
    /// resolves the conflict with `strategy`.
    #[tracing::instrument(
        skip_all,
        fields(record_id = %record_id, strategy = %strategy, expected = %expected_version)
    )]
    pub async fn attempt_update(
        &self,
        record_id: &RecordId,
        changes: Payload,
        expected_version: Version,
        actor: &ActorId,
        strategy: ConflictStrategy,
    ) -> Result<UpdateOutcome> {
        let operation = UpdateOperation {
            target_record_id: record_id.clone(),
            actor: actor.clone(),
            field_changes: changes,
            expected_version,
            timestamp: Utc::now(),
        };
        self.apply(operation, strategy).await
    }

    /// Like `attempt_update`, with the strategy given by name.
    ///
    /// The name is validated before the registry is touched.
    pub async fn attempt_update_named(
        &self,
        record_id: &RecordId,
        changes: Payload,
        expected_version: Version,
        actor: &ActorId,
        strategy: &str,
    ) -> Result<UpdateOutcome> {
        let strategy = strategy.parse::<ConflictStrategy>()?;
        self.attempt_update(record_id, changes, expected_version, actor, strategy)
            .await
    }

    /// Runs a prepared update operation.
    pub async fn apply(
        &self,
        operation: UpdateOperation,
        strategy: ConflictStrategy,
    ) -> Result<UpdateOutcome> {
        let record_id = &operation.target_record_id;

        let detection = self
            .registry
            .attempt_update(
                record_id,
                operation.field_changes.clone(),
                operation.expected_version,
                &operation.actor,
            )
            .await?;

        if !detection.has_conflict {
            metrics::counter!("record_updates_applied_total").increment(1);
            return Ok(UpdateOutcome::Applied {
                version: detection.current_version,
            });
        }

        metrics::counter!("record_conflicts_total", "strategy" => strategy.as_str()).increment(1);
        tracing::warn!(
            current = %detection.current_version,
            expected = %detection.expected_version,
            "version conflict, resolving"
        );

        for attempt in 1..=self.config.max_resolution_attempts {
            let current = self.registry.get(record_id).await?;
            let resolution = resolve(&current, &operation, strategy);

            if !resolution.resolved {
                self.reviews
                    .push(PendingReview {
                        update: operation.clone(),
                        current: current.clone(),
                        escalated_at: Utc::now(),
                    })
                    .await;
                metrics::counter!("record_conflicts_escalated_total").increment(1);
                tracing::warn!("conflict escalated for manual review");
                return Ok(UpdateOutcome::ManualConflictPending { detection, current });
            }

            if !resolution.field_conflicts.is_empty() {
                let fields: Vec<&str> = resolution
                    .field_conflicts
                    .iter()
                    .map(|c| c.field.as_str())
                    .collect();
                tracing::info!(?fields, "merge overwrote conflicting fields");
            }

            let commit = self
                .registry
                .apply_resolution(
                    record_id,
                    resolution.resolved_data.clone(),
                    current.version,
                    resolution.new_version,
                    &operation.actor,
                )
                .await?;

            if !commit.has_conflict {
                return Ok(UpdateOutcome::AutoResolved {
                    strategy,
                    version: commit.current_version,
                    resolution,
                    base: current,
                });
            }

            tracing::debug!(attempt, "resolution raced another writer, retrying");
        }

        Err(ConflictError::VersionConflict {
            record_id: record_id.clone(),
            attempts: self.config.max_resolution_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use state_store::InMemoryStateRegistry;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    async fn setup() -> (ConflictAwareUpdater<InMemoryStateRegistry>, RecordId, ActorId) {
        let registry = InMemoryStateRegistry::new();
        registry
            .create(DataRecord::new("r1", payload(json!({"a": 1})), "seed"))
            .await
            .unwrap();
        (
            ConflictAwareUpdater::new(registry),
            RecordId::new("r1"),
            ActorId::new("writer"),
        )
    }

    #[tokio::test]
    async fn test_applied_without_conflict() {
        let (updater, id, actor) = setup().await;

        let outcome = updater
            .attempt_update(
                &id,
                payload(json!({"a": 2})),
                Version::first(),
                &actor,
                ConflictStrategy::Manual,
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            UpdateOutcome::Applied { version } if version == Version::new(2)
        ));
        assert!(!outcome.had_conflict());
    }

    #[tokio::test]
    async fn test_last_write_wins_on_stale_update() {
        let (updater, id, actor) = setup().await;
        updater
            .attempt_update(
                &id,
                payload(json!({"a": 2})),
                Version::first(),
                &actor,
                ConflictStrategy::LastWriteWins,
            )
            .await
            .unwrap();

        let outcome = updater
            .attempt_update(
                &id,
                payload(json!({"b": 3})),
                Version::first(),
                &actor,
                ConflictStrategy::LastWriteWins,
            )
            .await
            .unwrap();

        match outcome {
            UpdateOutcome::AutoResolved {
                strategy,
                resolution,
                base,
                version,
            } => {
                assert_eq!(strategy, ConflictStrategy::LastWriteWins);
                assert_eq!(resolution.resolved_data, payload(json!({"a": 2, "b": 3})));
                assert_eq!(base.version, Version::new(2));
                assert_eq!(base.payload, payload(json!({"a": 2})));
                assert_eq!(version, Version::new(3));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let record = updater.registry().get(&id).await.unwrap();
        assert_eq!(record.payload, payload(json!({"a": 2, "b": 3})));
        assert_eq!(record.version, Version::new(3));
    }

    #[tokio::test]
    async fn test_first_write_wins_drops_update() {
        let (updater, id, actor) = setup().await;
        updater
            .attempt_update(
                &id,
                payload(json!({"a": 2})),
                Version::first(),
                &actor,
                ConflictStrategy::FirstWriteWins,
            )
            .await
            .unwrap();

        let outcome = updater
            .attempt_update(
                &id,
                payload(json!({"a": 5})),
                Version::first(),
                &actor,
                ConflictStrategy::FirstWriteWins,
            )
            .await
            .unwrap();

        assert_eq!(outcome.version(), Version::new(2));
        let record = updater.registry().get(&id).await.unwrap();
        assert_eq!(record.payload, payload(json!({"a": 2})));
        assert_eq!(record.version, Version::new(2));
    }

    #[tokio::test]
    async fn test_manual_escalates_without_writing() {
        let (updater, id, actor) = setup().await;
        updater
            .attempt_update(
                &id,
                payload(json!({"a": 2})),
                Version::first(),
                &actor,
                ConflictStrategy::Manual,
            )
            .await
            .unwrap();

        let outcome = updater
            .attempt_update(
                &id,
                payload(json!({"a": 9})),
                Version::first(),
                &actor,
                ConflictStrategy::Manual,
            )
            .await
            .unwrap();

        match &outcome {
            UpdateOutcome::ManualConflictPending { detection, current } => {
                assert!(detection.has_conflict);
                assert_eq!(current.version, Version::new(2));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(
            updater.registry().get(&id).await.unwrap().field("a"),
            Some(&json!(2))
        );
        let pending = updater.review_queue().pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].update.field_changes, payload(json!({"a": 9})));
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let (updater, _, actor) = setup().await;

        let err = updater
            .attempt_update(
                &RecordId::new("ghost"),
                Payload::new(),
                Version::first(),
                &actor,
                ConflictStrategy::Merge,
            )
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_strategy_name_touches_nothing() {
        let (updater, id, actor) = setup().await;

        let err = updater
            .attempt_update_named(&id, payload(json!({"a": 2})), Version::first(), &actor, "random")
            .await
            .unwrap_err();

        assert!(matches!(err, ConflictError::Configuration(_)));
        assert_eq!(
            updater.registry().get(&id).await.unwrap().version,
            Version::first()
        );
    }
}
