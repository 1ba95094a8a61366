//! Per-key async locks serialising read-modify-write sequences

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::DomainError;

/// Hands out one async mutex per key
///
/// Two actions on the same workflow instance queue up behind each other while
/// actions on different instances run concurrently. Entries nobody holds are
/// dropped on the next acquisition.
#[derive(Debug, Default)]
pub struct RequestLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`; released when the guard drops
    pub async fn acquire(&self, key: &str) -> Result<OwnedMutexGuard<()>, DomainError> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|e| {
                DomainError::internal(format!("Failed to acquire lock table: {}", e))
            })?;

            locks.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);

            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        Ok(lock.lock_owned().await)
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
