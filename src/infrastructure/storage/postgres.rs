//! PostgreSQL storage: one JSONB table per entity type

use std::fmt::Debug;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::domain::storage::{check_distinct_keys, Storage, StorageEntity, StorageKey, WriteBatch};
use crate::domain::DomainError;

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/sfa_workflow".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Opens a connection pool with these settings
    pub async fn connect(&self) -> Result<PgPool, DomainError> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .connect(&self.url)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))
    }
}

/// Entities stored as JSONB rows of `(key, partition_key, version, data)`
///
/// `partition_key` is indexed for per-instance lookups and `version` backs the
/// compare-and-swap in `update`.
pub struct PostgresStorage<E>
where
    E: StorageEntity,
{
    pool: PgPool,
    table_name: String,
    _phantom: PhantomData<E>,
}

impl<E> Debug for PostgresStorage<E>
where
    E: StorageEntity,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStorage")
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl<E> PostgresStorage<E>
where
    E: StorageEntity,
{
    pub fn new(pool: PgPool, table_name: impl Into<String>) -> Self {
        Self {
            pool,
            table_name: table_name.into(),
            _phantom: PhantomData,
        }
    }

    fn encode(entity: &E) -> Result<serde_json::Value, DomainError> {
        serde_json::to_value(entity)
            .map_err(|e| DomainError::storage(format!("Failed to serialize entity: {}", e)))
    }

    fn decode(row: &PgRow) -> Result<E, DomainError> {
        let data: serde_json::Value = row
            .try_get("data")
            .map_err(|e| DomainError::storage(format!("Failed to read row: {}", e)))?;

        serde_json::from_value(data)
            .map_err(|e| DomainError::storage(format!("Failed to deserialize entity: {}", e)))
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (key, partition_key, version, data) VALUES ($1, $2, $3, $4)",
            self.table_name
        )
    }

    fn update_sql(&self) -> String {
        format!(
            "UPDATE {} SET data = $3, version = $4, partition_key = $5, updated_at = NOW() \
             WHERE key = $1 AND version = $2",
            self.table_name
        )
    }

    fn exists_sql(&self) -> String {
        format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE key = $1) AS found",
            self.table_name
        )
    }

    fn select_sql(&self, filter: &str) -> String {
        format!(
            "SELECT data FROM {} {} ORDER BY created_at, key",
            self.table_name, filter
        )
    }
}

fn insert_error(key: &str, e: sqlx::Error) -> DomainError {
    let unique_violation = e
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);

    if unique_violation {
        DomainError::duplicate_key(key)
    } else {
        DomainError::storage(format!("Failed to insert entity '{}': {}", key, e))
    }
}

fn query_error(action: &str) -> impl FnOnce(sqlx::Error) -> DomainError + '_ {
    move |e| DomainError::storage(format!("Failed to {}: {}", action, e))
}

#[async_trait]
impl<E> Storage<E> for PostgresStorage<E>
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
        let query = format!("SELECT data FROM {} WHERE key = $1", self.table_name);

        let row = sqlx::query(&query)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("get entity"))?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list(&self) -> Result<Vec<E>, DomainError> {
        let rows = sqlx::query(&self.select_sql(""))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("list entities"))?;

        rows.iter().map(Self::decode).collect()
    }

    async fn list_partition(&self, partition: &str) -> Result<Vec<E>, DomainError> {
        let rows = sqlx::query(&self.select_sql("WHERE partition_key = $1"))
            .bind(partition)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("list partition"))?;

        rows.iter().map(Self::decode).collect()
    }

    async fn create(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str();

        sqlx::query(&self.insert_sql())
            .bind(key)
            .bind(entity.partition())
            .bind(entity.version() as i64)
            .bind(Self::encode(&entity)?)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(key, e))?;

        Ok(entity)
    }

    async fn write_batch(&self, mut batch: WriteBatch<E>) -> Result<WriteBatch<E>, DomainError> {
        check_distinct_keys(&batch)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_error("begin transaction"))?;
        let update_sql = self.update_sql();
        let insert_sql = self.insert_sql();

        // An early return drops `tx`, which rolls the whole batch back
        for entity in &mut batch.updates {
            let expected = entity.version();
            entity.bump_version();

            let result = sqlx::query(&update_sql)
                .bind(entity.key().as_str())
                .bind(expected as i64)
                .bind(Self::encode(entity)?)
                .bind(entity.version() as i64)
                .bind(entity.partition())
                .execute(&mut *tx)
                .await
                .map_err(query_error("update entity"))?;

            if result.rows_affected() == 0 {
                let key = entity.key().as_str();
                let found: bool = sqlx::query(&self.exists_sql())
                    .bind(key)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(query_error("check existence"))?
                    .try_get("found")
                    .map_err(query_error("read row"))?;

                return Err(if found {
                    DomainError::stale_version(key, expected)
                } else {
                    DomainError::not_found(format!("Entity with key '{}' not found", key))
                });
            }
        }

        for entity in &batch.inserts {
            let key = entity.key().as_str();

            sqlx::query(&insert_sql)
                .bind(key)
                .bind(entity.partition())
                .bind(entity.version() as i64)
                .bind(Self::encode(entity)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| insert_error(key, e))?;
        }

        tx.commit().await.map_err(query_error("commit transaction"))?;

        Ok(batch)
    }

    async fn update(&self, mut entity: E) -> Result<E, DomainError> {
        let expected = entity.version();
        entity.bump_version();

        let result = sqlx::query(&self.update_sql())
            .bind(entity.key().as_str())
            .bind(expected as i64)
            .bind(Self::encode(&entity)?)
            .bind(entity.version() as i64)
            .bind(entity.partition())
            .execute(&self.pool)
            .await
            .map_err(query_error("update entity"))?;

        if result.rows_affected() > 0 {
            return Ok(entity);
        }

        // Nothing matched: either the key is gone or another writer won
        let key = entity.key().as_str();

        if self.exists(entity.key()).await? {
            Err(DomainError::stale_version(key, expected))
        } else {
            Err(DomainError::not_found(format!(
                "Entity with key '{}' not found",
                key
            )))
        }
    }

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        let row = sqlx::query(&self.exists_sql())
            .bind(key.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("check existence"))?;

        row.try_get("found").map_err(query_error("read row"))
    }
}
