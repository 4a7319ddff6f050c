//! Shared identifier types used across the saga workspace.

mod types;

pub use types::{ActorId, CorrelationId, RecordId, TransactionId};
