//! Queue of conflicts awaiting a human decision.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::RecordId;
use state_store::DataRecord;
use tokio::sync::Mutex;

use crate::operation::UpdateOperation;

/// A `manual` conflict escalated for review.
#[derive(Debug, Clone)]
pub struct PendingReview {
    /// The rejected update.
    pub update: UpdateOperation,

    /// The record as it was when the conflict was detected.
    pub current: DataRecord,

    /// When the conflict was escalated.
    pub escalated_at: DateTime<Utc>,
}

impl PendingReview {
    /// The record under review.
    pub fn record_id(&self) -> &RecordId {
        &self.update.target_record_id
    }
}

/// FIFO of pending reviews shared between updater handles.
#[derive(Debug, Clone, Default)]
pub struct ReviewQueue {
    items: Arc<Mutex<VecDeque<PendingReview>>>,
}

impl ReviewQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a review.
    pub async fn push(&self, review: PendingReview) {
        self.items.lock().await.push_back(review);
    }

    /// Returns copies of all pending reviews, oldest first.
    pub async fn pending(&self) -> Vec<PendingReview> {
        self.items.lock().await.iter().cloned().collect()
    }

    /// Removes and returns the oldest review.
    pub async fn pop(&self) -> Option<PendingReview> {
        self.items.lock().await.pop_front()
    }

    /// Removes and returns every review for one record.
    pub async fn take_for(&self, record_id: &RecordId) -> Vec<PendingReview> {
        let mut items = self.items.lock().await;
        let (taken, kept): (Vec<_>, Vec<_>) = items
            .drain(..)
            .partition(|review| review.record_id() == record_id);
        items.extend(kept);
        taken
    }

    /// Number of pending reviews.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Returns true if nothing awaits review.
    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}
