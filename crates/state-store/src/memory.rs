use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::{
    ActorId, ConflictDetection, DataRecord, Payload, RecordId, Result, StateStoreError, Version,
    registry::StateRegistry,
};

/// A record slot. `None` marks a record deleted while a writer held the slot.
type Slot = Arc<Mutex<Option<DataRecord>>>;

/// In-memory state registry.
///
/// Records live in an arena keyed by id, each behind its own mutex, so
/// writers on different records never contend while writers on the same
/// record are serialized. Cloning the registry yields another handle to the
/// same partition.
#[derive(Clone, Default)]
pub struct InMemoryStateRegistry {
    records: Arc<RwLock<HashMap<RecordId, Slot>>>,
}

impl InMemoryStateRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns copies of all records, sorted by id.
    pub async fn snapshot(&self) -> Vec<DataRecord> {
        let slots: Vec<Slot> = self.records.read().await.values().cloned().collect();
        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(record) = slot.lock().await.as_ref() {
                records.push(record.clone());
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Removes every record.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    async fn slot(&self, id: &RecordId) -> Result<Slot> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StateStoreError::NotFound(id.clone()))
    }
}

#[async_trait]
impl StateRegistry for InMemoryStateRegistry {
    async fn get(&self, id: &RecordId) -> Result<DataRecord> {
        let slot = self.slot(id).await?;
        let guard = slot.lock().await;
        guard
            .clone()
            .ok_or_else(|| StateStoreError::NotFound(id.clone()))
    }

    async fn create(&self, mut record: DataRecord) -> Result<DataRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StateStoreError::AlreadyExists(record.id));
        }

        record.version = Version::first();
        records.insert(record.id.clone(), Arc::new(Mutex::new(Some(record.clone()))));
        Ok(record)
    }

    async fn attempt_update(
        &self,
        id: &RecordId,
        changes: Payload,
        expected_version: Version,
        actor: &ActorId,
    ) -> Result<ConflictDetection> {
        let slot = self.slot(id).await?;
        let mut guard = slot.lock().await;
        let record = guard
            .as_mut()
            .ok_or_else(|| StateStoreError::NotFound(id.clone()))?;

        if record.version != expected_version {
            tracing::debug!(
                record_id = %id,
                current = %record.version,
                expected = %expected_version,
                "version conflict detected"
            );
            return Ok(ConflictDetection::conflict(
                record.version,
                expected_version,
                changes.keys(),
            ));
        }

        record.payload.extend(changes);
        record.version = record.version.next();
        record.updated_at = Utc::now();
        record.updated_by = actor.clone();

        Ok(ConflictDetection::applied(record.version, expected_version))
    }

    async fn apply_resolution(
        &self,
        id: &RecordId,
        resolved: Payload,
        base_version: Version,
        new_version: Version,
        actor: &ActorId,
    ) -> Result<ConflictDetection> {
        let slot = self.slot(id).await?;
        let mut guard = slot.lock().await;
        let record = guard
            .as_mut()
            .ok_or_else(|| StateStoreError::NotFound(id.clone()))?;

        if record.version != base_version {
            return Ok(ConflictDetection::conflict(
                record.version,
                base_version,
                resolved.keys(),
            ));
        }
        if new_version < base_version {
            return Err(StateStoreError::VersionRegression {
                record_id: id.clone(),
                current: record.version,
                requested: new_version,
            });
        }
        if new_version == base_version {
            return Ok(ConflictDetection::applied(record.version, base_version));
        }

        record.payload = resolved;
        record.version = new_version;
        record.updated_at = Utc::now();
        record.updated_by = actor.clone();

        Ok(ConflictDetection::applied(record.version, base_version))
    }

    async fn force_apply(
        &self,
        id: &RecordId,
        resolved: Payload,
        new_version: Version,
        actor: &ActorId,
    ) -> Result<DataRecord> {
        let slot = self.slot(id).await?;
        let mut guard = slot.lock().await;
        let record = guard
            .as_mut()
            .ok_or_else(|| StateStoreError::NotFound(id.clone()))?;

        if new_version < record.version {
            return Err(StateStoreError::VersionRegression {
                record_id: id.clone(),
                current: record.version,
                requested: new_version,
            });
        }

        record.payload = resolved;
        record.version = new_version;
        record.updated_at = Utc::now();
        record.updated_by = actor.clone();

        Ok(record.clone())
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        let slot = self.records.write().await.remove(id);
        match slot {
            Some(slot) => Ok(slot.lock().await.take().is_some()),
            None => Ok(false),
        }
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}
