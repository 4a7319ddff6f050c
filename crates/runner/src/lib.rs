//! Drives batches of content publishing sagas against in-memory domains.
//!
//! The binary wires a [`Runner`] from [`Config`], submits
//! `SAGA_CONCURRENCY` sagas at once and prints their outcomes as JSON.

pub mod config;
pub mod error;

use std::sync::Arc;

use common::CorrelationId;
use conflict::{ReviewQueue, UpdaterConfig};
use saga::publishing::{self, PublishingSteps};
use saga::{CancellationHandle, SagaCatalog, SagaCoordinator, SagaOutcome, SubmitOptions};
use serde::Serialize;
use serde_json::Value;
use state_store::StateRegistryExt;

pub use config::{Config, LogFormat};
pub use error::{Result, RunnerError};

/// Aggregate view of one submitted batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failed sagas whose every executed step was compensated.
    pub fully_compensated: usize,
    /// Quota conflicts parked for review under the `manual` strategy.
    pub pending_reviews: usize,
    /// Publisher profile payload after the batch settled.
    pub profile: Option<Value>,
    pub outcomes: Vec<SagaOutcome>,
}

/// Coordinator plus the handles a run needs to inspect afterwards.
pub struct Runner {
    coordinator: Arc<SagaCoordinator>,
    steps: PublishingSteps,
    reviews: ReviewQueue,
    config: Config,
}

impl Runner {
    /// Builds the publishing catalog over freshly seeded in-memory domains.
    pub async fn new(config: Config) -> Result<Self> {
        let reviews = ReviewQueue::new();
        // Every saga in a batch races on the same profile record.
        let updater = UpdaterConfig {
            max_resolution_attempts: u32::try_from(config.concurrency)
                .unwrap_or(u32::MAX)
                .max(UpdaterConfig::default().max_resolution_attempts),
        };
        let steps = PublishingSteps::new(config.conflict_strategy)
            .with_review_queue(reviews.clone())
            .with_updater_config(updater);

        let mut catalog = SagaCatalog::new();
        catalog.register(steps.definition()?)?;

        let mut builder = SagaCoordinator::builder()
            .catalog(catalog)
            .config(config.coordinator_config());
        for domain in publishing::in_memory_domains().await? {
            builder = builder.domain(domain);
        }

        tracing::info!(
            concurrency = config.concurrency,
            strategy = %config.conflict_strategy,
            policy = %config.compensation_policy,
            step_timeout_ms = config.step_timeout.as_millis() as u64,
            "runner initialized"
        );

        Ok(Self {
            coordinator: Arc::new(builder.build()?),
            steps,
            reviews,
            config,
        })
    }

    pub fn coordinator(&self) -> &Arc<SagaCoordinator> {
        &self.coordinator
    }

    pub fn steps(&self) -> &PublishingSteps {
        &self.steps
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submits `concurrency` sagas at once and waits for all of them.
    ///
    /// Correlation ids are `{batch}-{n}`, so a batch label must not be reused
    /// against the same runner. Cancelling `cancel` stops every saga still
    /// running; each compensates what it already executed.
    pub async fn run_batch(
        &self,
        batch: &str,
        cancel: &CancellationHandle,
    ) -> Result<BatchSummary> {
        let submissions = (0..self.config.concurrency).map(|n| {
            let mut options = SubmitOptions::new().with_cancellation(cancel.signal());
            if let Some(index) = self.config.fail_at_step {
                options = options.fail_at_step(index);
            }
            let correlation_id = CorrelationId::new(format!("{batch}-{n}"));
            self.coordinator
                .submit_with(publishing::SAGA_TYPE, correlation_id, options)
        });

        let outcomes = futures_util::future::join_all(submissions)
            .await
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let fully_compensated = outcomes
            .iter()
            .filter(|o| !o.success && o.fully_compensated())
            .count();

        let profile = match self.coordinator.domain(publishing::DOMAIN_USER) {
            Some(user) => user
                .registry()
                .find(&publishing::PROFILE_RECORD_ID.into())
                .await
                .map_err(saga::SagaError::from)?
                .map(|record| Value::Object(record.payload)),
            None => None,
        };

        let summary = BatchSummary {
            submitted: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            fully_compensated,
            pending_reviews: self.reviews.len().await,
            profile,
            outcomes,
        };
        tracing::info!(
            batch,
            submitted = summary.submitted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch finished"
        );
        Ok(summary)
    }
}
