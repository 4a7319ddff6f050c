//! Optimistic-concurrency conflict handling.
//!
//! [`resolve`] is a pure function turning a detected version conflict into a
//! new state under a [`ConflictStrategy`]. [`ConflictAwareUpdater`] wraps a
//! state registry and resolves conflicts before returning to the caller,
//! escalating `manual` conflicts to a [`ReviewQueue`].

pub mod error;
pub mod operation;
pub mod resolver;
pub mod review;
pub mod strategy;
pub mod updater;

pub use error::{ConflictError, Result};
pub use operation::UpdateOperation;
pub use resolver::{ConflictResolution, FieldConflict, resolve, resolve_named};
pub use review::{PendingReview, ReviewQueue};
pub use strategy::ConflictStrategy;
pub use updater::{ConflictAwareUpdater, UpdateOutcome, UpdaterConfig};
