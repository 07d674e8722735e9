#![allow(dead_code)]

use async_trait::async_trait;
use lease_mutex::{LeaseStore, LockManager, LockOptions, MemoryStore, StoreError};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Memory store with switchable outages and call counters.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    unavailable: AtomicBool,
    lose_set_replies: AtomicBool,
    fail_deletes: AtomicBool,
    set_calls: AtomicU32,
    delete_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call fails with `StoreError::Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// `set_if_not_exists` applies the write but reports a transport failure.
    pub fn set_lose_replies(&self, lose: bool) {
        self.lose_set_replies.store(lose, Ordering::SeqCst);
    }

    /// `compare_and_delete` fails without touching the inner store.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn set_calls(&self) -> u32 {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LeaseStore for FlakyStore {
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let acquired = self.inner.set_if_not_exists(key, value, ttl).await?;
        if self.lose_set_replies.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reply lost".to_string()));
        }
        Ok(acquired)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("delete timed out".to_string()));
        }
        self.inner.compare_and_delete(key, expected).await
    }
}

pub fn options(expiry_secs: u64, tries: u32) -> LockOptions {
    LockOptions::default()
        .with_expiry(Duration::from_secs(expiry_secs))
        .with_retry_delay(Duration::from_millis(500))
        .with_tries(tries)
}

pub fn manager_on<S>(store: &Arc<S>, options: LockOptions) -> LockManager
where
    S: LeaseStore + 'static,
{
    LockManager::new("resource", store.clone() as Arc<dyn LeaseStore>, options).unwrap()
}
