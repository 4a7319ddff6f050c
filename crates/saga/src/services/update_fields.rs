//! Step that changes fields of an existing record under optimistic
//! concurrency.

use async_trait::async_trait;
use common::{ActorId, RecordId};
use conflict::{
    ConflictAwareUpdater, ConflictStrategy, ReviewQueue, UpdateOutcome, UpdaterConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use state_store::{Payload, StateRegistry, StateRegistryExt, Version};

use crate::context::{DomainState, SagaContext};
use crate::error::{Result, SagaError};
use crate::services::call_log::{CallKind, CallLog};
use crate::services::faults::FaultSwitch;
use crate::step::StepHandler;

/// Field added to every write, naming the saga that made it.
pub const CORRELATION_FIELD: &str = "last_correlation_id";

/// What an `UpdateFieldsStep` wrote, and what it replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdateReceipt {
    pub record_id: RecordId,
    /// False when the conflict strategy kept the stored state.
    pub applied: bool,
    /// The record's version after the write.
    pub version: Version,
    pub written: Payload,
    /// Values the written fields had in the record this write replaced;
    /// fields missing here were absent.
    pub previous: Payload,
    pub actor: ActorId,
}

/// Applies field changes to one record through the conflict-aware updater.
///
/// A version conflict with a concurrent saga is resolved with the configured
/// strategy. A `manual` conflict fails the step. Compensation restores the
/// previous value of every field that still holds this step's write, and
/// only while [`CORRELATION_FIELD`] still names this saga: a later saga's
/// write, even one with identical values, is never rolled back. Once
/// restored there is nothing left to undo, so repeated compensation is a
/// no-op.
#[derive(Debug, Clone)]
pub struct UpdateFieldsStep {
    action: String,
    compensating_action: String,
    record_id: RecordId,
    changes: Payload,
    strategy: ConflictStrategy,
    updater_config: UpdaterConfig,
    reviews: ReviewQueue,
    faults: FaultSwitch,
    log: CallLog,
}

impl UpdateFieldsStep {
    pub fn new(
        action: impl Into<String>,
        compensating_action: impl Into<String>,
        record_id: impl Into<RecordId>,
        changes: Payload,
    ) -> Self {
        Self {
            action: action.into(),
            compensating_action: compensating_action.into(),
            record_id: record_id.into(),
            changes,
            strategy: ConflictStrategy::LastWriteWins,
            updater_config: UpdaterConfig::default(),
            reviews: ReviewQueue::new(),
            faults: FaultSwitch::new(),
            log: CallLog::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_updater_config(mut self, config: UpdaterConfig) -> Self {
        self.updater_config = config;
        self
    }

    /// Shares the queue `manual` conflicts are escalated to.
    pub fn with_review_queue(mut self, reviews: ReviewQueue) -> Self {
        self.reviews = reviews;
        self
    }

    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    pub fn review_queue(&self) -> &ReviewQueue {
        &self.reviews
    }

    pub fn faults(&self) -> &FaultSwitch {
        &self.faults
    }

    pub fn call_log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl StepHandler for UpdateFieldsStep {
    async fn execute(&self, state: &DomainState, context: &SagaContext) -> Result<Value> {
        let before = state.registry().get(&self.record_id).await?;
        // stalls land between the read and the versioned write
        self.faults.before_execute(&self.action).await?;

        let mut written = self.changes.clone();
        written.insert(
            CORRELATION_FIELD.to_string(),
            json!(context.correlation_id.as_str()),
        );

        let updater = ConflictAwareUpdater::with_config(
            state.shared_registry(),
            self.updater_config.clone(),
        )
        .with_review_queue(self.reviews.clone());

        let outcome = updater
            .attempt_update(
                &self.record_id,
                written.clone(),
                before.version,
                &context.actor,
                self.strategy,
            )
            .await?;

        // A resolved write replaced the record the resolution was computed
        // from, not the one read above.
        let (applied, base) = match &outcome {
            UpdateOutcome::Applied { .. } => (true, &before),
            // first-write-wins resolves to the stored payload
            UpdateOutcome::AutoResolved { strategy, base, .. } => {
                (*strategy != ConflictStrategy::FirstWriteWins, base)
            }
            UpdateOutcome::ManualConflictPending { detection, .. } => {
                return Err(SagaError::StepExecution {
                    step: self.action.clone(),
                    reason: format!(
                        "conflict on '{}' escalated for manual review (expected {}, current {})",
                        self.record_id, detection.expected_version, detection.current_version
                    ),
                });
            }
        };

        let previous: Payload = written
            .keys()
            .filter_map(|field| base.field(field).map(|v| (field.clone(), v.clone())))
            .collect();

        self.log
            .record(CallKind::Execute, &self.action, self.record_id.as_str());
        tracing::debug!(
            domain = state.name(),
            record_id = %self.record_id,
            applied,
            conflict = outcome.had_conflict(),
            "fields updated"
        );

        Ok(serde_json::to_value(FieldUpdateReceipt {
            record_id: self.record_id.clone(),
            applied,
            version: outcome.version(),
            written,
            previous,
            actor: context.actor.clone(),
        })?)
    }

    async fn compensate(&self, state: &DomainState, result: &Value) -> Result<()> {
        self.faults.before_compensate(&self.compensating_action)?;

        let receipt: FieldUpdateReceipt = serde_json::from_value(result.clone())?;
        self.log.record(
            CallKind::Compensate,
            &self.compensating_action,
            receipt.record_id.as_str(),
        );
        if !receipt.applied {
            return Ok(());
        }

        for _ in 0..self.updater_config.max_resolution_attempts {
            let Some(current) = state.registry().find(&receipt.record_id).await? else {
                return Ok(());
            };
            if current.field(CORRELATION_FIELD) != receipt.written.get(CORRELATION_FIELD) {
                tracing::debug!(
                    domain = state.name(),
                    record_id = %receipt.record_id,
                    "record rewritten by a later saga, nothing to restore"
                );
                return Ok(());
            }

            let mut restored = current.payload.clone();
            let mut changed = false;
            for (field, value) in &receipt.written {
                if current.payload.get(field) != Some(value) {
                    continue;
                }
                match receipt.previous.get(field) {
                    Some(previous) if previous != value => {
                        restored.insert(field.clone(), previous.clone());
                        changed = true;
                    }
                    Some(_) => {}
                    None => {
                        restored.remove(field);
                        changed = true;
                    }
                }
            }
            if !changed {
                return Ok(());
            }

            let detection = state
                .registry()
                .apply_resolution(
                    &receipt.record_id,
                    restored,
                    current.version,
                    current.version.next(),
                    &receipt.actor,
                )
                .await?;
            if !detection.has_conflict {
                tracing::debug!(
                    domain = state.name(),
                    record_id = %receipt.record_id,
                    version = %detection.current_version,
                    "fields restored"
                );
                return Ok(());
            }
        }

        Err(SagaError::Compensation {
            step: self.compensating_action.clone(),
            reason: format!("'{}' kept changing during restore", receipt.record_id),
        })
    }
}
