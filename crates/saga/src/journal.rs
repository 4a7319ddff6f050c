//! Append-only journal of saga events.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::TransactionId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::events::SagaEvent;

/// One journaled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub transaction_id: TransactionId,
    /// Position within the transaction, starting at 1.
    pub sequence: u64,
    pub event_type: String,
    pub event: SagaEvent,
    pub recorded_at: DateTime<Utc>,
}

/// Storage for saga events.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait SagaJournal: Send + Sync {
    /// Appends an event and returns its sequence number.
    async fn append(&self, transaction_id: TransactionId, event: &SagaEvent) -> Result<u64>;

    /// Events for one transaction, in append order.
    async fn entries_for(&self, transaction_id: TransactionId) -> Result<Vec<JournalEntry>>;

    /// Ids of every transaction with at least one event.
    async fn transaction_ids(&self) -> Result<Vec<TransactionId>>;

    /// Drops every event of one transaction and returns how many there were.
    async fn remove(&self, transaction_id: TransactionId) -> Result<usize>;
}

/// In-memory journal.
///
/// Events are kept until their transaction is removed or the journal is
/// cleared, so long-running processes must prune finished sagas.
#[derive(Debug, Clone, Default)]
pub struct InMemorySagaJournal {
    entries: Arc<RwLock<HashMap<TransactionId, Vec<JournalEntry>>>>,
}

impl InMemorySagaJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all transactions.
    pub async fn event_count(&self) -> usize {
        self.entries.read().await.values().map(Vec::len).sum()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl SagaJournal for InMemorySagaJournal {
    async fn append(&self, transaction_id: TransactionId, event: &SagaEvent) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let stream = entries.entry(transaction_id).or_default();
        let sequence = stream.len() as u64 + 1;
        stream.push(JournalEntry {
            transaction_id,
            sequence,
            event_type: event.event_type().to_string(),
            event: event.clone(),
            recorded_at: Utc::now(),
        });
        Ok(sequence)
    }

    async fn entries_for(&self, transaction_id: TransactionId) -> Result<Vec<JournalEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .get(&transaction_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn transaction_ids(&self) -> Result<Vec<TransactionId>> {
        Ok(self.entries.read().await.keys().copied().collect())
    }

    async fn remove(&self, transaction_id: TransactionId) -> Result<usize> {
        Ok(self
            .entries
            .write()
            .await
            .remove(&transaction_id)
            .map_or(0, |entries| entries.len()))
    }
}
