pub mod memory;
pub mod redis;

use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Shared atomic key-value store acting as the lock arbiter.
///
/// Both operations must be atomic with respect to every other client of the store; the
/// correctness of the whole mutex rests on that.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Creates `key -> value` with the given time-to-live only if `key` is absent.
    ///
    /// Returns `true` iff the entry was created.
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Deletes `key` only if its current value equals `expected`.
    ///
    /// Returns `true` iff the entry was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;
}
