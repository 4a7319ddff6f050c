//! Versioned record storage for saga participants.
//!
//! Each logical domain owns one [`StateRegistry`] partition. Records carry a
//! monotonically increasing [`Version`] and are only mutated through the
//! registry's atomic check-and-set path.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod registry;

pub use common::{ActorId, RecordId};
pub use error::{Result, StateStoreError};
pub use memory::InMemoryStateRegistry;
pub use postgres::PostgresStateRegistry;
pub use record::{ConflictDetection, DataRecord, Payload, Version};
pub use registry::{StateRegistry, StateRegistryExt};
