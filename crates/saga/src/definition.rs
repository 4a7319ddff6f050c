//! Saga definitions and the catalog mapping transaction types to them.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::{Result, SagaError};
use crate::step::{SagaStep, StepHandler, StepMetadata};

/// An ordered list of steps registered under a transaction type.
#[derive(Debug, Clone)]
pub struct SagaDefinition {
    transaction_type: String,
    steps: Vec<SagaStep>,
}

impl SagaDefinition {
    /// Creates a validated definition.
    pub fn new(transaction_type: impl Into<String>, steps: Vec<SagaStep>) -> Result<Self> {
        let transaction_type = transaction_type.into();
        if transaction_type.trim().is_empty() {
            return Err(SagaError::Configuration(
                "transaction type must not be empty".to_string(),
            ));
        }
        if steps.is_empty() {
            return Err(SagaError::Configuration(format!(
                "saga '{transaction_type}' has no steps"
            )));
        }
        Ok(Self {
            transaction_type,
            steps,
        })
    }

    /// Starts building a definition.
    pub fn builder(transaction_type: impl Into<String>) -> SagaDefinitionBuilder {
        SagaDefinitionBuilder {
            transaction_type: transaction_type.into(),
            steps: Vec::new(),
        }
    }

    pub fn transaction_type(&self) -> &str {
        &self.transaction_type
    }

    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of the domains this saga touches.
    pub fn domains(&self) -> BTreeSet<&str> {
        self.steps.iter().map(SagaStep::domain).collect()
    }
}

/// Builder for [`SagaDefinition`].
#[derive(Debug)]
pub struct SagaDefinitionBuilder {
    transaction_type: String,
    steps: Vec<SagaStep>,
}

impl SagaDefinitionBuilder {
    pub fn step(mut self, metadata: StepMetadata, handler: impl StepHandler + 'static) -> Self {
        self.steps.push(SagaStep::new(metadata, handler));
        self
    }

    pub fn add_step(mut self, step: SagaStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Result<SagaDefinition> {
        SagaDefinition::new(self.transaction_type, self.steps)
    }
}

/// Declarative registry of saga definitions.
#[derive(Debug, Clone, Default)]
pub struct SagaCatalog {
    definitions: HashMap<String, Arc<SagaDefinition>>,
}

impl SagaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition. A type can only be registered once.
    pub fn register(&mut self, definition: SagaDefinition) -> Result<()> {
        if self.definitions.contains_key(definition.transaction_type()) {
            return Err(SagaError::Configuration(format!(
                "transaction type '{}' is already registered",
                definition.transaction_type()
            )));
        }
        self.definitions.insert(
            definition.transaction_type().to_string(),
            Arc::new(definition),
        );
        Ok(())
    }

    /// Looks up a definition; an unregistered type is a configuration error.
    pub fn get(&self, transaction_type: &str) -> Result<Arc<SagaDefinition>> {
        self.definitions
            .get(transaction_type)
            .cloned()
            .ok_or_else(|| {
                SagaError::Configuration(format!(
                    "unregistered transaction type '{transaction_type}'"
                ))
            })
    }

    pub fn definitions(&self) -> impl Iterator<Item = &SagaDefinition> {
        self.definitions.values().map(Arc::as_ref)
    }

    /// Registered transaction types, sorted.
    pub fn transaction_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
