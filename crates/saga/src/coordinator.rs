//! Saga coordinator for orchestrating multi-step sagas.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{CorrelationId, TransactionId};
use serde_json::Value;

use crate::cancel::CancellationSignal;
use crate::config::{CompensationPolicy, CoordinatorConfig, SubmitOptions};
use crate::context::{DomainState, SagaContext};
use crate::definition::{SagaCatalog, SagaDefinition};
use crate::error::{Result, SagaError};
use crate::events::SagaEvent;
use crate::journal::{InMemorySagaJournal, SagaJournal};
use crate::outcome::{CompensationDiagnostic, CompensationStatus, SagaOutcome};
use crate::step::SagaStep;
use crate::transaction::SagaTransaction;

/// Executes registered sagas against a fixed set of domains.
///
/// Steps run strictly in order. When one fails, every step that already
/// executed is compensated in reverse order before the outcome is returned,
/// even if the submission was cancelled. Every transition is journaled.
pub struct SagaCoordinator {
    catalog: SagaCatalog,
    domains: HashMap<String, Arc<DomainState>>,
    journal: Arc<dyn SagaJournal>,
    config: CoordinatorConfig,
}

impl SagaCoordinator {
    pub fn builder() -> SagaCoordinatorBuilder {
        SagaCoordinatorBuilder::default()
    }

    pub fn catalog(&self) -> &SagaCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Looks up a participating domain by name.
    pub fn domain(&self, name: &str) -> Option<&Arc<DomainState>> {
        self.domains.get(name)
    }

    pub fn journal(&self) -> &Arc<dyn SagaJournal> {
        &self.journal
    }

    /// Runs the saga registered under `transaction_type`.
    ///
    /// Returns `Err` only for configuration problems; step failures are
    /// reported through the outcome.
    pub async fn submit(
        &self,
        transaction_type: &str,
        correlation_id: impl Into<CorrelationId>,
    ) -> Result<SagaOutcome> {
        self.submit_with(transaction_type, correlation_id, SubmitOptions::default())
            .await
    }

    /// Like `submit`, with a timeout override, cancellation or fault injection.
    pub async fn submit_with(
        &self,
        transaction_type: &str,
        correlation_id: impl Into<CorrelationId>,
        options: SubmitOptions,
    ) -> Result<SagaOutcome> {
        let definition = self.catalog.get(transaction_type)?;
        self.execute_saga(&definition, correlation_id.into(), options)
            .await
    }

    /// Executes a saga definition.
    #[tracing::instrument(
        skip_all,
        fields(
            transaction_type = %definition.transaction_type(),
            correlation_id = %correlation_id,
            transaction_id = tracing::field::Empty,
        )
    )]
    pub async fn execute_saga(
        &self,
        definition: &SagaDefinition,
        correlation_id: CorrelationId,
        options: SubmitOptions,
    ) -> Result<SagaOutcome> {
        let states = self.states_for(definition)?;

        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();
        let transaction_id = TransactionId::new();
        tracing::Span::current().record("transaction_id", tracing::field::display(transaction_id));

        let step_timeout = options.step_timeout.unwrap_or(self.config.step_timeout);
        let mut cancellation = options.cancellation.clone();
        let mut transaction = SagaTransaction::default();
        let mut context = SagaContext::new(
            transaction_id,
            definition.transaction_type(),
            correlation_id.clone(),
        );

        self.record(
            &mut transaction,
            transaction_id,
            SagaEvent::saga_started(
                transaction_id,
                definition.transaction_type(),
                correlation_id.clone(),
                definition.steps().iter().map(|s| s.metadata().clone()).collect(),
            ),
        )
        .await;

        let mut failure = None;
        for (index, (step, state)) in definition.steps().iter().zip(&states).enumerate() {
            let action = step.action_name();
            tracing::info!(step = action, index, domain = step.domain(), "saga step started");
            self.record(
                &mut transaction,
                transaction_id,
                SagaEvent::step_started(index, action),
            )
            .await;

            let result = if options.fail_at_step == Some(index) {
                Err(SagaError::InjectedFault {
                    step: action.to_string(),
                })
            } else {
                self.execute_step(step, state, &context, step_timeout, cancellation.as_mut())
                    .await
            };

            match result {
                Ok(value) => {
                    tracing::info!(step = action, index, "saga step completed");
                    self.record(
                        &mut transaction,
                        transaction_id,
                        SagaEvent::step_completed(index, action, value.clone()),
                    )
                    .await;
                    context.push_result(action, value);
                }
                Err(e) => {
                    tracing::warn!(step = action, index, error = %e, "saga step failed");
                    self.record(
                        &mut transaction,
                        transaction_id,
                        SagaEvent::step_failed(index, action, e.to_string()),
                    )
                    .await;
                    failure = Some((index, e));
                    break;
                }
            }
        }

        let Some((failed_index, error)) = failure else {
            for name in definition.domains() {
                if let Some(state) = self.domains.get(name) {
                    state.mark_committed(transaction_id).await;
                }
            }
            self.record(&mut transaction, transaction_id, SagaEvent::saga_completed())
                .await;

            let duration = saga_start.elapsed();
            metrics::histogram!("saga_duration_seconds").record(duration.as_secs_f64());
            metrics::counter!("saga_completed").increment(1);
            tracing::info!(
                %transaction_id,
                duration = duration.as_secs_f64(),
                "saga completed successfully"
            );

            return Ok(self.outcome(
                &transaction,
                transaction_id,
                definition,
                correlation_id,
                Vec::new(),
                duration,
            ));
        };

        let diagnostics = self
            .compensate(
                definition,
                &states,
                &context,
                &mut transaction,
                failed_index,
                &error,
                step_timeout,
            )
            .await;

        let duration = saga_start.elapsed();
        metrics::histogram!("saga_duration_seconds").record(duration.as_secs_f64());
        metrics::counter!("saga_failed").increment(1);
        tracing::warn!(
            %transaction_id,
            failed_step = failed_index,
            reason = %error,
            "saga failed"
        );

        Ok(self.outcome(
            &transaction,
            transaction_id,
            definition,
            correlation_id,
            diagnostics,
            duration,
        ))
    }

    /// Runs compensating actions for executed steps in reverse order.
    #[allow(clippy::too_many_arguments)]
    async fn compensate(
        &self,
        definition: &SagaDefinition,
        states: &[Arc<DomainState>],
        context: &SagaContext,
        transaction: &mut SagaTransaction,
        failed_index: usize,
        error: &SagaError,
        step_timeout: Duration,
    ) -> Vec<CompensationDiagnostic> {
        let transaction_id = context.transaction_id;
        self.record(
            transaction,
            transaction_id,
            SagaEvent::compensation_started(failed_index, error.to_string()),
        )
        .await;

        let mut diagnostics = Vec::with_capacity(context.results().len());
        let mut halted = false;

        let executed_steps = definition
            .steps()
            .iter()
            .zip(states)
            .zip(context.results())
            .enumerate()
            .rev();
        for (index, ((step, state), executed)) in executed_steps {
            let compensating = step.compensating_action_name();

            if halted {
                self.record(
                    transaction,
                    transaction_id,
                    SagaEvent::compensation_step_skipped(index, compensating),
                )
                .await;
                diagnostics.push(CompensationDiagnostic::new(
                    index,
                    step.metadata(),
                    CompensationStatus::Skipped,
                ));
                continue;
            }

            match self
                .compensate_step(step, state, &executed.result, step_timeout)
                .await
            {
                Ok(()) => {
                    tracing::info!(step = compensating, index, "compensation step completed");
                    self.record(
                        transaction,
                        transaction_id,
                        SagaEvent::compensation_step_completed(index, compensating),
                    )
                    .await;
                    diagnostics.push(CompensationDiagnostic::new(
                        index,
                        step.metadata(),
                        CompensationStatus::Compensated,
                    ));
                }
                Err(e) => {
                    metrics::counter!("saga_compensations_failed").increment(1);
                    tracing::error!(
                        step = compensating,
                        index,
                        error = %e,
                        "compensation step failed"
                    );
                    self.record(
                        transaction,
                        transaction_id,
                        SagaEvent::compensation_step_failed(index, compensating, e.to_string()),
                    )
                    .await;
                    diagnostics.push(CompensationDiagnostic::new(
                        index,
                        step.metadata(),
                        CompensationStatus::Failed {
                            reason: e.to_string(),
                        },
                    ));
                    halted = self.config.compensation_policy == CompensationPolicy::HaltOnError;
                }
            }
        }

        let failed_step = definition
            .steps()
            .get(failed_index)
            .map(SagaStep::action_name)
            .unwrap_or("unknown");
        self.record(
            transaction,
            transaction_id,
            SagaEvent::saga_failed(format!("Step failed: {failed_step}")),
        )
        .await;

        diagnostics
    }

    async fn execute_step(
        &self,
        step: &SagaStep,
        state: &DomainState,
        context: &SagaContext,
        step_timeout: Duration,
        cancellation: Option<&mut CancellationSignal>,
    ) -> Result<Value> {
        let execution = tokio::time::timeout(step_timeout, step.handler().execute(state, context));

        let outcome = match cancellation {
            Some(signal) => {
                if signal.is_cancelled() {
                    return Err(SagaError::Cancelled {
                        step: step.action_name().to_string(),
                    });
                }
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => {
                        return Err(SagaError::Cancelled {
                            step: step.action_name().to_string(),
                        });
                    }
                    outcome = execution => outcome,
                }
            }
            None => execution.await,
        };

        outcome.map_err(|_| SagaError::Timeout {
            step: step.action_name().to_string(),
            timeout_ms: step_timeout.as_millis(),
        })?
    }

    async fn compensate_step(
        &self,
        step: &SagaStep,
        state: &DomainState,
        result: &Value,
        step_timeout: Duration,
    ) -> Result<()> {
        tokio::time::timeout(step_timeout, step.handler().compensate(state, result))
            .await
            .map_err(|_| SagaError::Timeout {
                step: step.compensating_action_name().to_string(),
                timeout_ms: step_timeout.as_millis(),
            })?
    }

    /// Rebuilds a transaction from the journal.
    pub async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<SagaTransaction>> {
        let entries = self.journal.entries_for(transaction_id).await?;
        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(SagaTransaction::replay(
            entries.into_iter().map(|entry| entry.event),
        )))
    }

    /// Drops the journal of a finished saga.
    ///
    /// Returns false when the transaction is unknown or still running.
    pub async fn forget_transaction(&self, transaction_id: TransactionId) -> Result<bool> {
        match self.get_transaction(transaction_id).await? {
            Some(transaction) if transaction.status().is_terminal() => {
                let removed = self.journal.remove(transaction_id).await?;
                tracing::debug!(%transaction_id, removed, "saga journal pruned");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn states_for(&self, definition: &SagaDefinition) -> Result<Vec<Arc<DomainState>>> {
        definition
            .steps()
            .iter()
            .map(|step| {
                self.domains.get(step.domain()).cloned().ok_or_else(|| {
                    SagaError::Configuration(format!(
                        "step '{}' targets unknown domain '{}'",
                        step.action_name(),
                        step.domain()
                    ))
                })
            })
            .collect()
    }

    /// Journals an event and applies it to the in-flight transaction.
    ///
    /// A journal failure is logged and never interrupts the saga, so that
    /// compensation always runs to the end.
    async fn record(
        &self,
        transaction: &mut SagaTransaction,
        transaction_id: TransactionId,
        event: SagaEvent,
    ) {
        if let Err(e) = self.journal.append(transaction_id, &event).await {
            tracing::error!(
                %transaction_id,
                event_type = event.event_type(),
                error = %e,
                "failed to journal saga event"
            );
        }
        transaction.apply(event);
    }

    fn outcome(
        &self,
        transaction: &SagaTransaction,
        transaction_id: TransactionId,
        definition: &SagaDefinition,
        correlation_id: CorrelationId,
        diagnostics: Vec<CompensationDiagnostic>,
        duration: Duration,
    ) -> SagaOutcome {
        SagaOutcome {
            transaction_id,
            transaction_type: definition.transaction_type().to_string(),
            correlation_id,
            success: transaction.status() == crate::state::SagaStatus::Completed,
            status: transaction.status(),
            completed_step_count: transaction.completed_step_count(),
            failed_step: transaction.failed_step(),
            failure_reason: transaction.failure_reason().map(str::to_string),
            diagnostics,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Builder for [`SagaCoordinator`].
#[derive(Default)]
pub struct SagaCoordinatorBuilder {
    catalog: SagaCatalog,
    domains: HashMap<String, Arc<DomainState>>,
    duplicate_domains: Vec<String>,
    journal: Option<Arc<dyn SagaJournal>>,
    config: CoordinatorConfig,
}

impl SagaCoordinatorBuilder {
    pub fn catalog(mut self, catalog: SagaCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Adds a participating domain.
    pub fn domain(self, state: DomainState) -> Self {
        self.shared_domain(Arc::new(state))
    }

    pub fn shared_domain(mut self, state: Arc<DomainState>) -> Self {
        let name = state.name().to_string();
        if self.domains.insert(name.clone(), state).is_some() {
            self.duplicate_domains.push(name);
        }
        self
    }

    pub fn journal(self, journal: impl SagaJournal + 'static) -> Self {
        self.shared_journal(Arc::new(journal))
    }

    pub fn shared_journal(mut self, journal: Arc<dyn SagaJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates that domain names are unique and that every registered
    /// step targets a known domain.
    pub fn build(self) -> Result<SagaCoordinator> {
        if let Some(name) = self.duplicate_domains.first() {
            return Err(SagaError::Configuration(format!(
                "domain '{name}' registered twice"
            )));
        }

        for definition in self.catalog.definitions() {
            for step in definition.steps() {
                if !self.domains.contains_key(step.domain()) {
                    return Err(SagaError::Configuration(format!(
                        "saga '{}' step '{}' targets unknown domain '{}'",
                        definition.transaction_type(),
                        step.action_name(),
                        step.domain()
                    )));
                }
            }
        }

        Ok(SagaCoordinator {
            catalog: self.catalog,
            domains: self.domains,
            journal: self
                .journal
                .unwrap_or_else(|| Arc::new(InMemorySagaJournal::new())),
            config: self.config,
        })
    }
}
