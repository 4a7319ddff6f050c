//! The result handed back to saga submitters.

use common::{CorrelationId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::state::SagaStatus;
use crate::step::StepMetadata;

/// What happened to one step's compensating action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompensationStatus {
    Compensated,
    Failed { reason: String },
    /// Not attempted: the halt policy stopped the reverse pass earlier.
    Skipped,
}

/// Compensation report for one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationDiagnostic {
    pub step_index: usize,
    pub domain: String,
    pub action_name: String,
    pub compensating_action_name: String,
    #[serde(flatten)]
    pub status: CompensationStatus,
}

impl CompensationDiagnostic {
    pub(crate) fn new(
        step_index: usize,
        metadata: &StepMetadata,
        status: CompensationStatus,
    ) -> Self {
        Self {
            step_index,
            domain: metadata.domain.clone(),
            action_name: metadata.action_name.clone(),
            compensating_action_name: metadata.compensating_action_name.clone(),
            status,
        }
    }
}

/// Final report of a saga submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaOutcome {
    pub transaction_id: TransactionId,
    pub transaction_type: String,
    pub correlation_id: CorrelationId,
    pub success: bool,
    pub status: SagaStatus,
    pub completed_step_count: usize,
    /// Index of the step that failed the forward pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// One entry per executed step, in the order compensation visited them.
    pub diagnostics: Vec<CompensationDiagnostic>,
    pub duration_ms: u64,
}

impl SagaOutcome {
    /// Step indexes whose compensation ran, in invocation order.
    pub fn compensated_steps(&self) -> Vec<usize> {
        self.steps_with(|s| matches!(s, CompensationStatus::Compensated))
    }

    pub fn failed_compensations(&self) -> Vec<usize> {
        self.steps_with(|s| matches!(s, CompensationStatus::Failed { .. }))
    }

    pub fn skipped_compensations(&self) -> Vec<usize> {
        self.steps_with(|s| matches!(s, CompensationStatus::Skipped))
    }

    /// True when every executed step was compensated.
    pub fn fully_compensated(&self) -> bool {
        self.diagnostics
            .iter()
            .all(|d| d.status == CompensationStatus::Compensated)
    }

    fn steps_with(&self, pred: impl Fn(&CompensationStatus) -> bool) -> Vec<usize> {
        self.diagnostics
            .iter()
            .filter(|d| pred(&d.status))
            .map(|d| d.step_index)
            .collect()
    }
}
