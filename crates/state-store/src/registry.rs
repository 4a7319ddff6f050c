use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    ActorId, ConflictDetection, DataRecord, Payload, RecordId, Result, StateStoreError, Version,
};

/// Authoritative versioned storage for one domain.
///
/// All implementations must be thread-safe (Send + Sync). Version-checked
/// writes are a single atomic step per record id: the check and the
/// mutation can never be split across two calls.
#[async_trait]
pub trait StateRegistry: Send + Sync {
    /// Returns a copy of the record, or `NotFound`.
    async fn get(&self, id: &RecordId) -> Result<DataRecord>;

    /// Inserts a new record at version 1.
    ///
    /// Whatever version the caller set is ignored. Fails with
    /// `AlreadyExists` if the id is taken.
    async fn create(&self, record: DataRecord) -> Result<DataRecord>;

    /// Merges `changes` into the record if its version equals
    /// `expected_version`.
    ///
    /// On a version mismatch the record is left untouched and the returned
    /// detection has `has_conflict = true` with the changed field names.
    async fn attempt_update(
        &self,
        id: &RecordId,
        changes: Payload,
        expected_version: Version,
        actor: &ActorId,
    ) -> Result<ConflictDetection>;

    /// Replaces the payload with a resolver's output if the record is still
    /// at `base_version`, moving it to `new_version`.
    ///
    /// When `new_version == base_version` the resolver decided to keep the
    /// stored state and nothing is written.
    async fn apply_resolution(
        &self,
        id: &RecordId,
        resolved: Payload,
        base_version: Version,
        new_version: Version,
        actor: &ActorId,
    ) -> Result<ConflictDetection>;

    /// Replaces payload and version without a version check.
    ///
    /// Used to commit an authoritative decision or a compensating rollback.
    /// Rejects a `new_version` below the stored one with `VersionRegression`.
    async fn force_apply(
        &self,
        id: &RecordId,
        resolved: Payload,
        new_version: Version,
        actor: &ActorId,
    ) -> Result<DataRecord>;

    /// Removes a record. Returns false when it was already absent.
    async fn delete(&self, id: &RecordId) -> Result<bool>;

    /// Number of records in this partition.
    async fn len(&self) -> Result<usize>;
}

#[async_trait]
impl<T: StateRegistry + ?Sized> StateRegistry for Arc<T> {
    async fn get(&self, id: &RecordId) -> Result<DataRecord> {
        (**self).get(id).await
    }

    async fn create(&self, record: DataRecord) -> Result<DataRecord> {
        (**self).create(record).await
    }

    async fn attempt_update(
        &self,
        id: &RecordId,
        changes: Payload,
        expected_version: Version,
        actor: &ActorId,
    ) -> Result<ConflictDetection> {
        (**self)
            .attempt_update(id, changes, expected_version, actor)
            .await
    }

    async fn apply_resolution(
        &self,
        id: &RecordId,
        resolved: Payload,
        base_version: Version,
        new_version: Version,
        actor: &ActorId,
    ) -> Result<ConflictDetection> {
        (**self)
            .apply_resolution(id, resolved, base_version, new_version, actor)
            .await
    }

    async fn force_apply(
        &self,
        id: &RecordId,
        resolved: Payload,
        new_version: Version,
        actor: &ActorId,
    ) -> Result<DataRecord> {
        (**self).force_apply(id, resolved, new_version, actor).await
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        (**self).delete(id).await
    }

    async fn len(&self) -> Result<usize> {
        (**self).len().await
    }
}

/// Convenience methods available on every registry.
#[async_trait]
pub trait StateRegistryExt: StateRegistry {
    /// Like `get`, but maps `NotFound` to `None`.
    async fn find(&self, id: &RecordId) -> Result<Option<DataRecord>> {
        match self.get(id).await {
            Ok(record) => Ok(Some(record)),
            Err(StateStoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Checks whether a record exists.
    async fn contains(&self, id: &RecordId) -> Result<bool> {
        Ok(self.find(id).await?.is_some())
    }

    /// Returns true if the partition holds no records.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

impl<T: StateRegistry + ?Sized> StateRegistryExt for T {}
