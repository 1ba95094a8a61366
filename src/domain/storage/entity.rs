//! Storage entity traits and types

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

/// Trait for types that can be used as storage keys
pub trait StorageKey: Clone + Debug + Send + Sync + Eq + std::hash::Hash {
    /// Returns the key as a string for storage backends that require string keys
    fn as_str(&self) -> &str;
}

/// Trait for types that can be stored
///
/// Every entity carries a monotonic version used for compare-and-swap updates:
/// an update only succeeds when the caller's version matches the stored one,
/// and the stored copy is written back with the version incremented.
pub trait StorageEntity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned {
    /// The key type for this entity
    type Key: StorageKey;

    /// Returns the entity's key
    fn key(&self) -> &Self::Key;

    /// Returns the partition this entity belongs to, if any
    ///
    /// Backends index on the partition so grouped lookups avoid a full scan.
    fn partition(&self) -> Option<String> {
        None
    }

    /// Returns the entity's current version
    fn version(&self) -> u64;

    /// Overwrites the entity's version
    fn set_version(&mut self, version: u64);

    /// Advances the version after a successful write and returns the new one
    fn bump_version(&mut self) -> u64 {
        let next = self.version() + 1;
        self.set_version(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    struct TestKey(String);

    impl StorageKey for TestKey {
        fn as_str(&self) -> &str {
            &self.0
        }
    }

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct TestEntity {
        id: TestKey,
        group: String,
        version: u64,
    }

    impl StorageEntity for TestEntity {
        type Key = TestKey;

        fn key(&self) -> &Self::Key {
            &self.id
        }

        fn partition(&self) -> Option<String> {
            Some(self.group.clone())
        }

        fn version(&self) -> u64 {
            self.version
        }

        fn set_version(&mut self, version: u64) {
            self.version = version;
        }
    }

    #[test]
    fn test_storage_key_as_str() {
        let key = TestKey("test-key".to_string());
        assert_eq!(key.as_str(), "test-key");
    }

    #[test]
    fn test_key_partition_and_version() {
        let mut entity = TestEntity {
            id: TestKey("entity-1".to_string()),
            group: "return_request:42".to_string(),
            version: 1,
        };
        assert_eq!(entity.key().as_str(), "entity-1");
        assert_eq!(entity.partition().as_deref(), Some("return_request:42"));

        assert_eq!(entity.bump_version(), 2);
        assert_eq!(entity.bump_version(), 3);
        assert_eq!(entity.version(), 3);
    }

    #[test]
    fn test_partition_defaults_to_none() {
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
        struct Unpartitioned {
            id: TestKey,
        }

        impl StorageEntity for Unpartitioned {
            type Key = TestKey;

            fn key(&self) -> &Self::Key {
                &self.id
            }

            fn version(&self) -> u64 {
                0
            }

            fn set_version(&mut self, _version: u64) {}
        }

        let entity = Unpartitioned {
            id: TestKey("solo".to_string()),
        };
        assert!(entity.partition().is_none());
    }
}
