//! Event-sourced saga transaction.

use common::{CorrelationId, TransactionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::SagaEvent;
use crate::state::SagaStatus;
use crate::step::StepMetadata;

/// The state of one saga execution, rebuilt from its journal events.
///
/// `apply` is infallible: events are facts that already happened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaTransaction {
    id: Option<TransactionId>,
    transaction_type: String,
    correlation_id: Option<CorrelationId>,
    steps: Vec<StepMetadata>,
    status: SagaStatus,
    /// Results of executed steps, indexed by step position.
    results: Vec<Value>,
    failed_step: Option<usize>,
    failure_reason: Option<String>,
    compensated_steps: Vec<usize>,
    failed_compensations: Vec<usize>,
    skipped_compensations: Vec<usize>,
    /// Number of events applied.
    event_count: u64,
}

impl SagaTransaction {
    /// Rebuilds a transaction by replaying its events in order.
    pub fn replay(events: impl IntoIterator<Item = SagaEvent>) -> Self {
        let mut transaction = Self::default();
        for event in events {
            transaction.apply(event);
        }
        transaction
    }

    pub fn apply(&mut self, event: SagaEvent) {
        self.event_count += 1;
        match event {
            SagaEvent::SagaStarted(data) => {
                self.id = Some(data.transaction_id);
                self.transaction_type = data.transaction_type;
                self.correlation_id = Some(data.correlation_id);
                self.steps = data.steps;
                self.transition(SagaStatus::InProgress);
            }
            SagaEvent::StepStarted(_) => {}
            SagaEvent::StepCompleted(data) => {
                self.results.push(data.result);
            }
            SagaEvent::StepFailed(data) => {
                self.failed_step = Some(data.step_index);
                self.failure_reason = Some(data.error);
            }
            SagaEvent::CompensationStarted(data) => {
                self.transition(SagaStatus::Compensating);
                self.failed_step = Some(data.failed_step);
            }
            SagaEvent::CompensationStepCompleted(data) => {
                self.compensated_steps.push(data.step_index);
            }
            SagaEvent::CompensationStepFailed(data) => {
                self.failed_compensations.push(data.step_index);
            }
            SagaEvent::CompensationStepSkipped(data) => {
                self.skipped_compensations.push(data.step_index);
            }
            SagaEvent::SagaCompleted(_) => {
                self.transition(SagaStatus::Completed);
            }
            SagaEvent::SagaFailed(data) => {
                self.transition(SagaStatus::Failed);
                if self.failure_reason.is_none() {
                    self.failure_reason = Some(data.reason);
                }
            }
        }
    }

    fn transition(&mut self, next: SagaStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "invalid saga transition {} -> {next}",
            self.status
        );
        self.status = next;
    }
}

// Query methods
impl SagaTransaction {
    pub fn id(&self) -> Option<TransactionId> {
        self.id
    }

    pub fn transaction_type(&self) -> &str {
        &self.transaction_type
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    pub fn steps(&self) -> &[StepMetadata] {
        &self.steps
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Number of steps whose execute action succeeded.
    pub fn completed_step_count(&self) -> usize {
        self.results.len()
    }

    /// Result of the executed step at `index`.
    pub fn result(&self, index: usize) -> Option<&Value> {
        self.results.get(index)
    }

    /// Index of the step that failed the forward pass.
    pub fn failed_step(&self) -> Option<usize> {
        self.failed_step
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Step indexes compensated successfully, in the order they ran.
    pub fn compensated_steps(&self) -> &[usize] {
        &self.compensated_steps
    }

    pub fn failed_compensations(&self) -> &[usize] {
        &self.failed_compensations
    }

    pub fn skipped_compensations(&self) -> &[usize] {
        &self.skipped_compensations
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn started() -> (TransactionId, SagaTransaction) {
        let id = TransactionId::new();
        let mut transaction = SagaTransaction::default();
        transaction.apply(SagaEvent::saga_started(
            id,
            "ContentPublishing",
            CorrelationId::new("c-1"),
            vec![
                StepMetadata::new("user", "reserve", "release"),
                StepMetadata::new("content", "draft", "delete_draft"),
                StepMetadata::new("ai", "queue", "cancel"),
            ],
        ));
        (id, transaction)
    }

    #[test]
    fn test_default_transaction() {
        let transaction = SagaTransaction::default();
        assert!(transaction.id().is_none());
        assert_eq!(transaction.status(), SagaStatus::Pending);
        assert_eq!(transaction.completed_step_count(), 0);
    }

    #[test]
    fn test_apply_saga_started() {
        let (id, transaction) = started();
        assert_eq!(transaction.id(), Some(id));
        assert_eq!(transaction.transaction_type(), "ContentPublishing");
        assert_eq!(transaction.correlation_id().map(|c| c.as_str()), Some("c-1"));
        assert_eq!(transaction.steps().len(), 3);
        assert_eq!(transaction.status(), SagaStatus::InProgress);
    }

    #[test]
    fn test_apply_step_lifecycle() {
        let (_, mut transaction) = started();

        for (index, name) in ["reserve", "draft", "queue"].into_iter().enumerate() {
            transaction.apply(SagaEvent::step_started(index, name));
            transaction.apply(SagaEvent::step_completed(index, name, json!({ "step": index })));
            assert_eq!(transaction.completed_step_count(), index + 1);
        }
        transaction.apply(SagaEvent::saga_completed());

        assert_eq!(transaction.status(), SagaStatus::Completed);
        assert!(transaction.status().is_terminal());
        assert_eq!(transaction.result(1), Some(&json!({"step": 1})));
        assert!(transaction.failure_reason().is_none());
    }

    #[test]
    fn test_apply_step_failure_and_compensation() {
        let (_, mut transaction) = started();
        transaction.apply(SagaEvent::step_started(0, "reserve"));
        transaction.apply(SagaEvent::step_completed(0, "reserve", json!(null)));
        transaction.apply(SagaEvent::step_started(1, "draft"));
        transaction.apply(SagaEvent::step_failed(1, "draft", "storage offline"));
        assert_eq!(transaction.failure_reason(), Some("storage offline"));

        transaction.apply(SagaEvent::compensation_started(1, "storage offline"));
        assert_eq!(transaction.status(), SagaStatus::Compensating);

        transaction.apply(SagaEvent::compensation_step_completed(0, "release"));
        transaction.apply(SagaEvent::saga_failed("step 'draft' failed"));

        assert_eq!(transaction.status(), SagaStatus::Failed);
        assert_eq!(transaction.failed_step(), Some(1));
        assert_eq!(transaction.completed_step_count(), 1);
        assert_eq!(transaction.compensated_steps(), &[0]);
        assert_eq!(transaction.failure_reason(), Some("storage offline"));
    }

    #[test]
    fn test_compensation_failure_does_not_change_status() {
        let (_, mut transaction) = started();
        transaction.apply(SagaEvent::step_completed(0, "reserve", json!(null)));
        transaction.apply(SagaEvent::step_failed(1, "draft", "error"));
        transaction.apply(SagaEvent::compensation_started(1, "error"));
        transaction.apply(SagaEvent::compensation_step_failed(0, "release", "unavailable"));

        assert_eq!(transaction.status(), SagaStatus::Compensating);
        assert_eq!(transaction.failed_compensations(), &[0]);
    }

    #[test]
    fn test_replay_matches_incremental_apply() {
        let id = TransactionId::new();
        let events = vec![
            SagaEvent::saga_started(id, "T", CorrelationId::new("c"), vec![]),
            SagaEvent::step_completed(0, "a", json!(1)),
            SagaEvent::step_failed(1, "b", "boom"),
            SagaEvent::compensation_started(1, "boom"),
            SagaEvent::compensation_step_skipped(0, "undo_a"),
            SagaEvent::saga_failed("boom"),
        ];

        let transaction = SagaTransaction::replay(events);

        assert_eq!(transaction.id(), Some(id));
        assert_eq!(transaction.event_count(), 6);
        assert_eq!(transaction.skipped_compensations(), &[0]);
        assert_eq!(transaction.status(), SagaStatus::Failed);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid saga transition pending -> completed")]
    fn test_completion_before_start_is_rejected() {
        let mut transaction = SagaTransaction::default();
        transaction.apply(SagaEvent::saga_completed());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid saga transition in_progress -> failed")]
    fn test_failure_without_compensation_is_rejected() {
        let (_, mut transaction) = started();
        transaction.apply(SagaEvent::saga_failed("boom"));
    }

    #[test]
    fn test_serialization() {
        let (id, mut transaction) = started();
        transaction.apply(SagaEvent::step_completed(0, "reserve", json!({"quota": 1})));

        let json = serde_json::to_string(&transaction).unwrap();
        let deserialized: SagaTransaction = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.id(), Some(id));
        assert_eq!(deserialized.status(), SagaStatus::InProgress);
        assert_eq!(deserialized.result(0), Some(&json!({"quota": 1})));
    }
}
