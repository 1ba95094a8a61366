//! Storage infrastructure - Storage implementations

mod factory;
mod in_memory;
pub mod migrations;
mod postgres;

pub use factory::{StorageConfig, StorageFactory, StorageType};
pub use in_memory::InMemoryStorage;
pub use migrations::{
    run_storage_migrations, Migration, PostgresMigrator, APPROVAL_WORKFLOWS_TABLE,
    WORKFLOW_STEPS_TABLE,
};
pub use postgres::{PostgresConfig, PostgresStorage};
