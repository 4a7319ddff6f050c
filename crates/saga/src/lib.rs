//! Saga coordination across independent domains.
//!
//! A [`SagaCoordinator`] runs the ordered steps of a registered
//! [`SagaDefinition`] against per-domain state registries. If any step fails,
//! the steps that already executed are compensated in reverse order. Every
//! transition is recorded in a [`SagaJournal`], from which a
//! [`SagaTransaction`] can be rebuilt.
//!
//! The [`publishing`] module wires the in-memory [`services`] into a
//! four-step content publishing saga used by tests and the demo runner.

pub mod cancel;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod definition;
pub mod error;
pub mod events;
pub mod journal;
pub mod outcome;
pub mod publishing;
pub mod services;
pub mod state;
pub mod step;
pub mod transaction;

pub use cancel::{CancellationHandle, CancellationSignal, cancellation};
pub use config::{CompensationPolicy, CoordinatorConfig, SubmitOptions};
pub use context::{DomainState, SagaContext, StepResult};
pub use coordinator::{SagaCoordinator, SagaCoordinatorBuilder};
pub use definition::{SagaCatalog, SagaDefinition, SagaDefinitionBuilder};
pub use error::{Result, SagaError};
pub use events::SagaEvent;
pub use journal::{InMemorySagaJournal, JournalEntry, SagaJournal};
pub use outcome::{CompensationDiagnostic, CompensationStatus, SagaOutcome};
pub use services::{
    CallKind, CallLog, CreateRecordStep, CreatedRecord, FaultSwitch, FieldUpdateReceipt,
    StepCall, UpdateFieldsStep,
};
pub use state::SagaStatus;
pub use step::{SagaStep, StepHandler, StepMetadata};
pub use transaction::SagaTransaction;
