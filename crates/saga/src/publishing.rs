//! Content publishing saga built from the in-memory step handlers.
//!
//! The saga follows these steps:
//! 1. Reserve publishing quota on the shared publisher profile (user)
//! 2. Create a content draft (content)
//! 3. Queue a generation job (ai)
//! 4. Record a publish event (analytics)
//!
//! If any step fails, previously completed steps are compensated in reverse order.

use conflict::{ConflictStrategy, ReviewQueue, UpdaterConfig};
use serde_json::json;
use state_store::{DataRecord, InMemoryStateRegistry, Payload, StateRegistry, StateRegistryExt};

use crate::context::DomainState;
use crate::definition::SagaDefinition;
use crate::error::Result;
use crate::services::{CallLog, CreateRecordStep, UpdateFieldsStep};
use crate::step::StepMetadata;

/// The transaction type identifier for content publishing.
pub const SAGA_TYPE: &str = "ContentPublishing";

pub const DOMAIN_USER: &str = "user";
pub const DOMAIN_CONTENT: &str = "content";
pub const DOMAIN_AI: &str = "ai";
pub const DOMAIN_ANALYTICS: &str = "analytics";

/// Every domain the saga touches, in step order.
pub const DOMAINS: [&str; 4] = [DOMAIN_USER, DOMAIN_CONTENT, DOMAIN_AI, DOMAIN_ANALYTICS];

/// Id of the publisher profile every saga updates.
pub const PROFILE_RECORD_ID: &str = "publisher-profile";

pub const STEP_RESERVE_QUOTA: &str = "reserve_publishing_quota";
pub const STEP_RELEASE_QUOTA: &str = "release_publishing_quota";
pub const STEP_CREATE_DRAFT: &str = "create_content_draft";
pub const STEP_DELETE_DRAFT: &str = "delete_content_draft";
pub const STEP_QUEUE_GENERATION: &str = "queue_generation_job";
pub const STEP_CANCEL_GENERATION: &str = "cancel_generation_job";
pub const STEP_RECORD_PUBLISH: &str = "record_publish_event";
pub const STEP_DELETE_PUBLISH: &str = "delete_publish_event";

/// Handles to the four step handlers, so callers can flip faults and read
/// the shared call log.
#[derive(Debug, Clone)]
pub struct PublishingSteps {
    pub reserve_quota: UpdateFieldsStep,
    pub create_draft: CreateRecordStep,
    pub queue_generation: CreateRecordStep,
    pub record_publish: CreateRecordStep,
    log: CallLog,
}

impl PublishingSteps {
    /// Builds the handlers; `strategy` settles quota update conflicts
    /// between concurrent sagas.
    pub fn new(strategy: ConflictStrategy) -> Self {
        let log = CallLog::new();
        Self {
            reserve_quota: UpdateFieldsStep::new(
                STEP_RESERVE_QUOTA,
                STEP_RELEASE_QUOTA,
                PROFILE_RECORD_ID,
                fields(json!({"publishing": true})),
            )
            .with_strategy(strategy)
            .with_call_log(log.clone()),
            create_draft: CreateRecordStep::new(
                STEP_CREATE_DRAFT,
                STEP_DELETE_DRAFT,
                "draft",
                fields(json!({"status": "draft"})),
            )
            .with_call_log(log.clone()),
            queue_generation: CreateRecordStep::new(
                STEP_QUEUE_GENERATION,
                STEP_CANCEL_GENERATION,
                "job",
                fields(json!({"status": "queued"})),
            )
            .with_call_log(log.clone()),
            record_publish: CreateRecordStep::new(
                STEP_RECORD_PUBLISH,
                STEP_DELETE_PUBLISH,
                "event",
                fields(json!({"kind": "publish"})),
            )
            .with_call_log(log.clone()),
            log,
        }
    }

    /// Shares a review queue for `manual` quota conflicts.
    pub fn with_review_queue(mut self, reviews: ReviewQueue) -> Self {
        self.reserve_quota = self.reserve_quota.with_review_queue(reviews);
        self
    }

    /// Overrides how often a raced quota update is re-resolved.
    pub fn with_updater_config(mut self, config: UpdaterConfig) -> Self {
        self.reserve_quota = self.reserve_quota.with_updater_config(config);
        self
    }

    /// Invocation log shared by all four handlers.
    pub fn call_log(&self) -> &CallLog {
        &self.log
    }

    /// The saga definition wired to these handlers.
    pub fn definition(&self) -> Result<SagaDefinition> {
        SagaDefinition::builder(SAGA_TYPE)
            .step(
                StepMetadata::new(DOMAIN_USER, STEP_RESERVE_QUOTA, STEP_RELEASE_QUOTA),
                self.reserve_quota.clone(),
            )
            .step(
                StepMetadata::new(DOMAIN_CONTENT, STEP_CREATE_DRAFT, STEP_DELETE_DRAFT),
                self.create_draft.clone(),
            )
            .step(
                StepMetadata::new(DOMAIN_AI, STEP_QUEUE_GENERATION, STEP_CANCEL_GENERATION),
                self.queue_generation.clone(),
            )
            .step(
                StepMetadata::new(DOMAIN_ANALYTICS, STEP_RECORD_PUBLISH, STEP_DELETE_PUBLISH),
                self.record_publish.clone(),
            )
            .build()
    }
}

impl Default for PublishingSteps {
    fn default() -> Self {
        Self::new(ConflictStrategy::LastWriteWins)
    }
}

/// Creates the publisher profile unless it already exists.
pub async fn seed_profile(registry: &dyn StateRegistry) -> Result<DataRecord> {
    if let Some(existing) = registry.find(&PROFILE_RECORD_ID.into()).await? {
        return Ok(existing);
    }
    Ok(registry
        .create(DataRecord::new(
            PROFILE_RECORD_ID,
            fields(json!({"plan": "pro", "publishing": false})),
            "seed",
        ))
        .await?)
}

/// In-memory domains for the saga, with the profile seeded.
pub async fn in_memory_domains() -> Result<Vec<DomainState>> {
    let user = InMemoryStateRegistry::new();
    seed_profile(&user).await?;

    let mut domains = vec![DomainState::new(DOMAIN_USER, user)];
    for name in [DOMAIN_CONTENT, DOMAIN_AI, DOMAIN_ANALYTICS] {
        domains.push(DomainState::new(name, InMemoryStateRegistry::new()));
    }
    Ok(domains)
}

fn fields(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::SagaStep;

    #[test]
    fn test_definition_order() {
        let definition = PublishingSteps::default().definition().unwrap();

        assert_eq!(definition.transaction_type(), SAGA_TYPE);
        let actions: Vec<_> = definition.steps().iter().map(SagaStep::action_name).collect();
        assert_eq!(
            actions,
            vec![
                STEP_RESERVE_QUOTA,
                STEP_CREATE_DRAFT,
                STEP_QUEUE_GENERATION,
                STEP_RECORD_PUBLISH
            ]
        );
        let domains: Vec<_> = definition.steps().iter().map(SagaStep::domain).collect();
        assert_eq!(domains, DOMAINS.to_vec());
    }

    #[tokio::test]
    async fn test_seed_profile_is_idempotent() {
        let registry = InMemoryStateRegistry::new();
        let first = seed_profile(&registry).await.unwrap();
        let second = seed_profile(&registry).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_domains() {
        let domains = in_memory_domains().await.unwrap();
        let names: Vec<_> = domains.iter().map(DomainState::name).collect();
        assert_eq!(names, DOMAINS.to_vec());
        assert!(
            domains[0]
                .registry()
                .contains(&PROFILE_RECORD_ID.into())
                .await
                .unwrap()
        );
    }
}
