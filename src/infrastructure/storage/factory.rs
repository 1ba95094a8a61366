//! Storage factory for runtime backend selection

use std::str::FromStr;
use std::sync::Arc;

use sqlx::PgPool;

use crate::domain::storage::{Storage, StorageEntity};
use crate::domain::DomainError;

use super::in_memory::InMemoryStorage;
use super::postgres::{PostgresConfig, PostgresStorage};

/// Supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    InMemory,
    Postgres,
}

impl FromStr for StorageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(DomainError::configuration(format!(
                "Unknown storage backend '{}' (expected 'memory' or 'postgres')",
                other
            ))),
        }
    }
}

/// Resolved storage settings
#[derive(Debug, Clone)]
pub enum StorageConfig {
    InMemory,
    Postgres(PostgresConfig),
}

impl StorageConfig {
    /// Builds the storage settings from the `[storage]` config section
    pub fn from_backend(
        backend: &str,
        database_url: Option<&str>,
        max_connections: u32,
    ) -> Result<Self, DomainError> {
        match backend.parse::<StorageType>()? {
            StorageType::InMemory => Ok(Self::InMemory),
            StorageType::Postgres => {
                let url = database_url
                    .filter(|url| !url.trim().is_empty())
                    .ok_or_else(|| {
                        DomainError::configuration("storage.database_url is required for postgres")
                    })?;

                Ok(Self::Postgres(
                    PostgresConfig::new(url).with_max_connections(max_connections),
                ))
            }
        }
    }
}

/// Creates storages that share one backend choice
#[derive(Debug)]
pub struct StorageFactory;

impl StorageFactory {
    /// PostgreSQL storage over `pool` when given, in-memory otherwise
    pub fn create<E>(pool: Option<&PgPool>, table_name: &str) -> Arc<dyn Storage<E>>
    where
        E: StorageEntity + 'static,
    {
        match pool {
            Some(pool) => Arc::new(PostgresStorage::<E>::new(pool.clone(), table_name)),
            None => Arc::new(InMemoryStorage::<E>::new()),
        }
    }
}
