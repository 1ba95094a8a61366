//! Storage domain - Generic storage abstraction layer

mod entity;
mod repository;

pub use entity::{StorageEntity, StorageKey};
pub(crate) use repository::{check_distinct_keys, check_version};
pub use repository::{Storage, WriteBatch};

#[cfg(test)]
pub use repository::mock;
