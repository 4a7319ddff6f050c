//! Saga journal events.

use chrono::{DateTime, Utc};
use common::{CorrelationId, TransactionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::StepMetadata;

/// Events recorded during saga execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// Saga execution started.
    SagaStarted(SagaStartedData),

    /// A step's execute action started.
    StepStarted(StepData),

    /// A step's execute action returned a result.
    StepCompleted(StepCompletedData),

    /// A step's execute action failed, timed out or was cancelled.
    StepFailed(StepFailedData),

    /// Compensation started after a step failure.
    CompensationStarted(CompensationData),

    /// A compensating action completed.
    CompensationStepCompleted(StepData),

    /// A compensating action failed.
    CompensationStepFailed(StepFailedData),

    /// A compensating action was not attempted because an earlier one failed
    /// under the halt policy.
    CompensationStepSkipped(StepData),

    /// Every step completed.
    SagaCompleted(SagaCompletedData),

    /// Compensation finished after a failure.
    SagaFailed(SagaFailedData),
}

impl SagaEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::StepStarted(_) => "StepStarted",
            SagaEvent::StepCompleted(_) => "StepCompleted",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::CompensationStarted(_) => "CompensationStarted",
            SagaEvent::CompensationStepCompleted(_) => "CompensationStepCompleted",
            SagaEvent::CompensationStepFailed(_) => "CompensationStepFailed",
            SagaEvent::CompensationStepSkipped(_) => "CompensationStepSkipped",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::SagaFailed(_) => "SagaFailed",
        }
    }
}

/// Data for SagaStarted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub transaction_id: TransactionId,
    pub transaction_type: String,
    pub correlation_id: CorrelationId,
    /// The ordered steps of the definition at submission time.
    pub steps: Vec<StepMetadata>,
    pub started_at: DateTime<Utc>,
}

/// Identifies one step and the action involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepData {
    pub step_index: usize,
    pub action_name: String,
}

/// Data for StepCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCompletedData {
    pub step_index: usize,
    pub action_name: String,
    /// The value returned by `execute`, later passed to `compensate`.
    pub result: Value,
}

/// Data for StepFailed and CompensationStepFailed events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailedData {
    pub step_index: usize,
    pub action_name: String,
    pub error: String,
}

/// Data for CompensationStarted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationData {
    /// Index of the step whose failure triggered compensation.
    pub failed_step: usize,
    pub reason: String,
}

/// Data for SagaCompleted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaCompletedData {
    pub completed_at: DateTime<Utc>,
}

/// Data for SagaFailed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaFailedData {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl SagaEvent {
    pub fn saga_started(
        transaction_id: TransactionId,
        transaction_type: impl Into<String>,
        correlation_id: CorrelationId,
        steps: Vec<StepMetadata>,
    ) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            transaction_id,
            transaction_type: transaction_type.into(),
            correlation_id,
            steps,
            started_at: Utc::now(),
        })
    }

    pub fn step_started(step_index: usize, action_name: impl Into<String>) -> Self {
        SagaEvent::StepStarted(StepData {
            step_index,
            action_name: action_name.into(),
        })
    }

    pub fn step_completed(
        step_index: usize,
        action_name: impl Into<String>,
        result: Value,
    ) -> Self {
        SagaEvent::StepCompleted(StepCompletedData {
            step_index,
            action_name: action_name.into(),
            result,
        })
    }

    pub fn step_failed(
        step_index: usize,
        action_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::StepFailed(StepFailedData {
            step_index,
            action_name: action_name.into(),
            error: error.into(),
        })
    }

    pub fn compensation_started(failed_step: usize, reason: impl Into<String>) -> Self {
        SagaEvent::CompensationStarted(CompensationData {
            failed_step,
            reason: reason.into(),
        })
    }

    pub fn compensation_step_completed(step_index: usize, action_name: impl Into<String>) -> Self {
        SagaEvent::CompensationStepCompleted(StepData {
            step_index,
            action_name: action_name.into(),
        })
    }

    pub fn compensation_step_failed(
        step_index: usize,
        action_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::CompensationStepFailed(StepFailedData {
            step_index,
            action_name: action_name.into(),
            error: error.into(),
        })
    }

    pub fn compensation_step_skipped(step_index: usize, action_name: impl Into<String>) -> Self {
        SagaEvent::CompensationStepSkipped(StepData {
            step_index,
            action_name: action_name.into(),
        })
    }

    pub fn saga_completed() -> Self {
        SagaEvent::SagaCompleted(SagaCompletedData {
            completed_at: Utc::now(),
        })
    }

    pub fn saga_failed(reason: impl Into<String>) -> Self {
        SagaEvent::SagaFailed(SagaFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_types() {
        assert_eq!(SagaEvent::step_started(0, "a").event_type(), "StepStarted");
        assert_eq!(
            SagaEvent::compensation_step_skipped(1, "undo").event_type(),
            "CompensationStepSkipped"
        );
        assert_eq!(SagaEvent::saga_failed("x").event_type(), "SagaFailed");
    }

    #[test]
    fn test_adjacently_tagged_serialization() {
        let event = SagaEvent::step_completed(2, "create_content_draft", json!({"id": "d-1"}));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "StepCompleted");
        assert_eq!(value["data"]["step_index"], 2);
        assert_eq!(value["data"]["result"]["id"], "d-1");

        let back: SagaEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_started_event_carries_steps() {
        let steps = vec![StepMetadata::new("user", "reserve", "release")];
        let id = TransactionId::new();
        let SagaEvent::SagaStarted(data) =
            SagaEvent::saga_started(id, "T", CorrelationId::new("c"), steps.clone())
        else {
            panic!("expected SagaStarted");
        };
        assert_eq!(data.transaction_id, id);
        assert_eq!(data.steps, steps);
    }
}
