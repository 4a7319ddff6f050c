//! Step that creates one record per saga.

use async_trait::async_trait;
use common::{CorrelationId, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use state_store::{DataRecord, Payload, StateRegistry, Version};

use crate::context::{DomainState, SagaContext};
use crate::error::Result;
use crate::services::call_log::{CallKind, CallLog};
use crate::services::faults::FaultSwitch;
use crate::step::StepHandler;

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRecord {
    pub record_id: RecordId,
    pub version: Version,
}

/// Creates `{prefix}-{correlation id}` in the step's domain.
///
/// Compensation deletes the record. Deleting a record that is already gone
/// succeeds, so compensating twice is the same as compensating once.
#[derive(Debug, Clone)]
pub struct CreateRecordStep {
    action: String,
    compensating_action: String,
    prefix: String,
    fields: Payload,
    faults: FaultSwitch,
    log: CallLog,
}

impl CreateRecordStep {
    pub fn new(
        action: impl Into<String>,
        compensating_action: impl Into<String>,
        prefix: impl Into<String>,
        fields: Payload,
    ) -> Self {
        Self {
            action: action.into(),
            compensating_action: compensating_action.into(),
            prefix: prefix.into(),
            fields,
            faults: FaultSwitch::new(),
            log: CallLog::new(),
        }
    }

    /// Shares a call log with other handlers.
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn faults(&self) -> &FaultSwitch {
        &self.faults
    }

    pub fn call_log(&self) -> &CallLog {
        &self.log
    }

    /// The id of the record this step creates for `correlation_id`.
    pub fn record_id_for(&self, correlation_id: &CorrelationId) -> RecordId {
        RecordId::new(format!("{}-{}", self.prefix, correlation_id))
    }
}

#[async_trait]
impl StepHandler for CreateRecordStep {
    async fn execute(&self, state: &DomainState, context: &SagaContext) -> Result<Value> {
        self.faults.before_execute(&self.action).await?;

        let record_id = self.record_id_for(&context.correlation_id);
        let mut payload = self.fields.clone();
        payload.insert(
            "correlation_id".to_string(),
            json!(context.correlation_id.as_str()),
        );
        payload.insert(
            "transaction_id".to_string(),
            json!(context.transaction_id.to_string()),
        );

        let record = state
            .registry()
            .create(DataRecord::new(record_id.clone(), payload, context.actor.clone()))
            .await?;
        self.log
            .record(CallKind::Execute, &self.action, record_id.as_str());
        tracing::debug!(domain = state.name(), %record_id, "record created");

        Ok(serde_json::to_value(CreatedRecord {
            record_id,
            version: record.version,
        })?)
    }

    async fn compensate(&self, state: &DomainState, result: &Value) -> Result<()> {
        self.faults.before_compensate(&self.compensating_action)?;

        let created: CreatedRecord = serde_json::from_value(result.clone())?;
        let removed = state.registry().delete(&created.record_id).await?;
        self.log.record(
            CallKind::Compensate,
            &self.compensating_action,
            created.record_id.as_str(),
        );
        tracing::debug!(
            domain = state.name(),
            record_id = %created.record_id,
            removed,
            "record deleted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SagaError;
    use common::TransactionId;
    use state_store::{InMemoryStateRegistry, StateRegistryExt, StateStoreError};

    fn setup() -> (CreateRecordStep, DomainState, SagaContext) {
        let step = CreateRecordStep::new("create_draft", "delete_draft", "draft", Payload::new());
        let state = DomainState::new("content", InMemoryStateRegistry::new());
        let context = SagaContext::new(TransactionId::new(), "T", CorrelationId::new("c-9"));
        (step, state, context)
    }

    #[tokio::test]
    async fn test_execute_and_compensate() {
        let (step, state, context) = setup();

        let result = step.execute(&state, &context).await.unwrap();
        assert_eq!(result["record_id"], "draft-c-9");
        assert_eq!(result["version"], 1);

        let record = state.registry().get(&RecordId::new("draft-c-9")).await.unwrap();
        assert_eq!(record.field("correlation_id"), Some(&json!("c-9")));
        assert_eq!(record.updated_by.as_str(), "saga:T");

        step.compensate(&state, &result).await.unwrap();
        assert!(!state.registry().contains(&RecordId::new("draft-c-9")).await.unwrap());
        assert_eq!(step.call_log().executed(), vec!["create_draft"]);
        assert_eq!(step.call_log().compensated(), vec!["delete_draft"]);
    }

    #[tokio::test]
    async fn test_compensate_twice_is_compensate_once() {
        let (step, state, context) = setup();
        let result = step.execute(&state, &context).await.unwrap();

        step.compensate(&state, &result).await.unwrap();
        step.compensate(&state, &result).await.unwrap();

        assert!(state.registry().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_correlation_fails() {
        let (step, state, context) = setup();
        step.execute(&state, &context).await.unwrap();

        let err = step.execute(&state, &context).await.unwrap_err();
        assert!(matches!(
            err,
            SagaError::Store(StateStoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_fault_toggles() {
        let (step, state, context) = setup();
        step.faults().set_fail_on_execute(true);
        assert!(step.execute(&state, &context).await.is_err());
        assert!(state.registry().is_empty().await.unwrap());
        assert!(step.call_log().is_empty());

        step.faults().set_fail_on_execute(false);
        let result = step.execute(&state, &context).await.unwrap();
        step.faults().set_fail_on_compensate(true);
        assert!(matches!(
            step.compensate(&state, &result).await,
            Err(SagaError::Compensation { .. })
        ));
        assert_eq!(state.registry().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_result_is_rejected() {
        let (step, state, _) = setup();
        let err = step.compensate(&state, &json!({"nope": 1})).await.unwrap_err();
        assert!(matches!(err, SagaError::Serialization(_)));
    }
}
