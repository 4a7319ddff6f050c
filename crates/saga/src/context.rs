//! Per-domain state handles and the execution context passed to steps.

use std::collections::HashSet;
use std::sync::Arc;

use common::{ActorId, CorrelationId, TransactionId};
use serde_json::Value;
use state_store::StateRegistry;
use tokio::sync::RwLock;

/// A named domain: its registry partition plus the set of transactions
/// that committed against it.
///
/// Domains are shared by every saga that touches them, so the committed
/// flag is tracked per transaction.
pub struct DomainState {
    name: String,
    registry: Arc<dyn StateRegistry>,
    commits: RwLock<HashSet<TransactionId>>,
}

impl DomainState {
    pub fn new(name: impl Into<String>, registry: impl StateRegistry + 'static) -> Self {
        Self::with_shared_registry(name, Arc::new(registry))
    }

    pub fn with_shared_registry(name: impl Into<String>, registry: Arc<dyn StateRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            commits: RwLock::new(HashSet::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The domain's registry.
    pub fn registry(&self) -> &dyn StateRegistry {
        self.registry.as_ref()
    }

    /// A cloned handle to the domain's registry.
    pub fn shared_registry(&self) -> Arc<dyn StateRegistry> {
        Arc::clone(&self.registry)
    }

    /// Records that `transaction_id` completed with this domain participating.
    pub async fn mark_committed(&self, transaction_id: TransactionId) {
        self.commits.write().await.insert(transaction_id);
    }

    pub async fn is_committed(&self, transaction_id: TransactionId) -> bool {
        self.commits.read().await.contains(&transaction_id)
    }

    /// Number of transactions committed against this domain.
    pub async fn committed_count(&self) -> usize {
        self.commits.read().await.len()
    }
}

impl std::fmt::Debug for DomainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainState")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Result produced by an executed step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub action_name: String,
    pub result: Value,
}

/// Execution context handed to every `execute` call.
#[derive(Debug, Clone)]
pub struct SagaContext {
    pub transaction_id: TransactionId,
    pub transaction_type: String,
    pub correlation_id: CorrelationId,
    /// Identity written into `updated_by` by steps of this saga.
    pub actor: ActorId,
    results: Vec<StepResult>,
}

impl SagaContext {
    pub fn new(
        transaction_id: TransactionId,
        transaction_type: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        let transaction_type = transaction_type.into();
        Self {
            actor: ActorId::new(format!("saga:{transaction_type}")),
            transaction_id,
            transaction_type,
            correlation_id,
            results: Vec::new(),
        }
    }

    /// Results of the steps executed so far, in execution order.
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// The result of the earlier step named `action_name`.
    pub fn result_of(&self, action_name: &str) -> Option<&Value> {
        self.results
            .iter()
            .find(|r| r.action_name == action_name)
            .map(|r| &r.result)
    }

    pub(crate) fn push_result(&mut self, action_name: impl Into<String>, result: Value) {
        self.results.push(StepResult {
            action_name: action_name.into(),
            result,
        });
    }
}
