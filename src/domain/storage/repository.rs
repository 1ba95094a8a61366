//! Storage trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

use super::entity::{StorageEntity, StorageKey};

/// Persistence for versioned entities
///
/// Rows are never removed; entities that support soft deletion carry their
/// own active flag and are rewritten through `update`.
#[async_trait]
pub trait Storage<E>: Send + Sync + Debug
where
    E: StorageEntity + 'static,
{
    /// Retrieves an entity by its key
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError>;

    /// Retrieves all entities
    async fn list(&self) -> Result<Vec<E>, DomainError>;

    /// Retrieves all entities in a partition
    async fn list_partition(&self, partition: &str) -> Result<Vec<E>, DomainError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|e| e.partition().as_deref() == Some(partition))
            .collect())
    }

    /// Creates a new entity, returns error if already exists
    async fn create(&self, entity: E) -> Result<E, DomainError>;

    /// Creates all entities or none of them
    async fn create_batch(&self, entities: Vec<E>) -> Result<Vec<E>, DomainError> {
        Ok(self.write_batch(WriteBatch::inserts(entities)).await?.inserts)
    }

    /// Applies every update and insert of the batch, or none of them
    ///
    /// Updates follow the same compare-and-swap rules as `update`; inserts the
    /// same uniqueness rules as `create`. The returned batch carries the
    /// stored versions.
    async fn write_batch(&self, batch: WriteBatch<E>) -> Result<WriteBatch<E>, DomainError>;

    /// Updates an existing entity with compare-and-swap on its version
    ///
    /// Returns `NotFound` if the key does not exist and `Conflict` if the stored
    /// version differs from `entity.version()`. The returned entity carries the
    /// incremented version.
    async fn update(&self, entity: E) -> Result<E, DomainError>;

    /// Checks if an entity exists by its key
    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Updates and inserts committed together by `Storage::write_batch`
#[derive(Debug, Clone)]
pub struct WriteBatch<E> {
    pub updates: Vec<E>,
    pub inserts: Vec<E>,
}

impl<E> Default for WriteBatch<E> {
    fn default() -> Self {
        Self {
            updates: Vec::new(),
            inserts: Vec::new(),
        }
    }
}

impl<E> WriteBatch<E> {
    pub fn inserts(inserts: Vec<E>) -> Self {
        Self {
            updates: Vec::new(),
            inserts,
        }
    }

    pub fn updates(updates: Vec<E>) -> Self {
        Self {
            updates,
            inserts: Vec::new(),
        }
    }

    pub fn with_inserts(mut self, inserts: Vec<E>) -> Self {
        self.inserts = inserts;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty()
    }
}

/// Rejects a batch that names the same key twice
pub(crate) fn check_distinct_keys<E: StorageEntity>(batch: &WriteBatch<E>) -> Result<(), DomainError> {
    let mut seen = std::collections::HashSet::new();

    for entity in batch.updates.iter().chain(&batch.inserts) {
        if !seen.insert(entity.key().as_str()) {
            return Err(DomainError::duplicate_key(entity.key().as_str()));
        }
    }

    Ok(())
}

/// Checks a compare-and-swap precondition shared by all backends
pub(crate) fn check_version<E: StorageEntity>(stored: &E, incoming: &E) -> Result<(), DomainError> {
    if stored.version() != incoming.version() {
        return Err(DomainError::stale_version(
            incoming.key().as_str(),
            incoming.version(),
        ));
    }

    Ok(())
}
