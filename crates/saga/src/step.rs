//! The step contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{DomainState, SagaContext};
use crate::error::Result;

/// Immutable description of one saga step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMetadata {
    /// Name of the domain whose registry the step operates on.
    pub domain: String,
    /// Name of the forward action.
    pub action_name: String,
    /// Name of the action that semantically undoes the forward action.
    pub compensating_action_name: String,
}

impl StepMetadata {
    pub fn new(
        domain: impl Into<String>,
        action_name: impl Into<String>,
        compensating_action_name: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            action_name: action_name.into(),
            compensating_action_name: compensating_action_name.into(),
        }
    }
}

/// Behaviour behind a saga step.
///
/// `execute` returns a result value that is handed back unchanged to
/// `compensate` if a later step fails. `compensate` must tolerate being
/// invoked more than once with the same result.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Performs the forward action against the domain's state.
    async fn execute(&self, state: &DomainState, context: &SagaContext) -> Result<Value>;

    /// Undoes the forward action described by `result`.
    async fn compensate(&self, state: &DomainState, result: &Value) -> Result<()>;
}

/// A step registered in a saga definition.
#[derive(Clone)]
pub struct SagaStep {
    metadata: StepMetadata,
    handler: Arc<dyn StepHandler>,
}

impl SagaStep {
    /// Binds metadata to a handler.
    pub fn new(metadata: StepMetadata, handler: impl StepHandler + 'static) -> Self {
        Self::from_arc(metadata, Arc::new(handler))
    }

    /// Binds metadata to a shared handler.
    pub fn from_arc(metadata: StepMetadata, handler: Arc<dyn StepHandler>) -> Self {
        Self { metadata, handler }
    }

    pub fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    pub fn domain(&self) -> &str {
        &self.metadata.domain
    }

    pub fn action_name(&self) -> &str {
        &self.metadata.action_name
    }

    pub fn compensating_action_name(&self) -> &str {
        &self.metadata.compensating_action_name
    }

    pub fn handler(&self) -> &Arc<dyn StepHandler> {
        &self.handler
    }
}

impl std::fmt::Debug for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaStep")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
