//! In-memory storage implementation

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::storage::{
    check_distinct_keys, check_version, Storage, StorageEntity, StorageKey, WriteBatch,
};
use crate::domain::DomainError;

/// Entities plus their insertion order, so lists come back oldest first like
/// the PostgreSQL backend's `ORDER BY created_at`
#[derive(Debug)]
struct Table<E> {
    rows: HashMap<String, E>,
    order: Vec<String>,
}

impl<E> Default for Table<E> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<E: StorageEntity> Table<E> {
    fn insert(&mut self, entity: E) {
        let key = entity.key().as_str().to_string();
        self.order.push(key.clone());
        self.rows.insert(key, entity);
    }

    fn ordered(&self) -> impl Iterator<Item = &E> {
        self.order.iter().filter_map(|key| self.rows.get(key))
    }
}

/// Thread-safe in-memory storage
///
/// Default backend for development and tests. Data is lost when the process
/// terminates.
#[derive(Debug)]
pub struct InMemoryStorage<E>
where
    E: StorageEntity,
{
    table: RwLock<Table<E>>,
}

impl<E> Default for InMemoryStorage<E>
where
    E: StorageEntity,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> InMemoryStorage<E>
where
    E: StorageEntity,
{
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::default()),
        }
    }

    /// Storage pre-populated with entities, in the given order
    pub fn with_entities(entities: Vec<E>) -> Self {
        let mut table = Table::default();

        for entity in entities {
            table.insert(entity);
        }

        Self {
            table: RwLock::new(table),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Table<E>>, DomainError> {
        self.table
            .read()
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Table<E>>, DomainError> {
        self.table
            .write()
            .map_err(|e| DomainError::storage(format!("Failed to acquire write lock: {}", e)))
    }
}

fn not_found(key: &str) -> DomainError {
    DomainError::not_found(format!("Entity with key '{}' not found", key))
}

#[async_trait]
impl<E> Storage<E> for InMemoryStorage<E>
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
        Ok(self.read()?.rows.get(key.as_str()).cloned())
    }

    async fn list(&self) -> Result<Vec<E>, DomainError> {
        Ok(self.read()?.ordered().cloned().collect())
    }

    async fn list_partition(&self, partition: &str) -> Result<Vec<E>, DomainError> {
        Ok(self
            .read()?
            .ordered()
            .filter(|e| e.partition().as_deref() == Some(partition))
            .cloned()
            .collect())
    }

    async fn create(&self, entity: E) -> Result<E, DomainError> {
        let mut table = self.write()?;

        if table.rows.contains_key(entity.key().as_str()) {
            return Err(DomainError::duplicate_key(entity.key().as_str()));
        }

        table.insert(entity.clone());
        Ok(entity)
    }

    async fn write_batch(&self, mut batch: WriteBatch<E>) -> Result<WriteBatch<E>, DomainError> {
        check_distinct_keys(&batch)?;
        let mut table = self.write()?;

        // Whole batch is checked before anything is written
        for entity in &batch.updates {
            let stored = table
                .rows
                .get(entity.key().as_str())
                .ok_or_else(|| not_found(entity.key().as_str()))?;
            check_version(stored, entity)?;
        }

        if let Some(taken) = batch
            .inserts
            .iter()
            .find(|e| table.rows.contains_key(e.key().as_str()))
        {
            return Err(DomainError::duplicate_key(taken.key().as_str()));
        }

        for entity in &mut batch.updates {
            entity.bump_version();
            table
                .rows
                .insert(entity.key().as_str().to_string(), entity.clone());
        }

        for entity in &batch.inserts {
            table.insert(entity.clone());
        }

        Ok(batch)
    }

    async fn update(&self, mut entity: E) -> Result<E, DomainError> {
        let mut table = self.write()?;

        let stored = table
            .rows
            .get_mut(entity.key().as_str())
            .ok_or_else(|| not_found(entity.key().as_str()))?;

        check_version(stored, &entity)?;
        entity.bump_version();
        *stored = entity.clone();

        Ok(entity)
    }

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.read()?.rows.contains_key(key.as_str()))
    }
}
