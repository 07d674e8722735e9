use crate::clock::deadline_after;
use crate::error::StoreError;
use crate::storage::LeaseStore;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct LeaseEntry {
    value: String,
    expires_at: Instant,
}

impl LeaseEntry {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: deadline_after(Instant::now(), ttl),
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process lease store.
///
/// Entries carry a deadline on the tokio clock and are treated as absent once it passes, so TTL
/// behaviour holds even if no sweep ever runs.
#[derive(Default)]
pub struct MemoryStore {
    leases: DashMap<String, LeaseEntry>, // key -> current lease
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            leases: DashMap::new(),
        }
    }

    /// Current holder's token for `key`, if a live lease exists.
    pub fn holder(&self, key: &str) -> Option<String> {
        self.leases
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// Removes every expired entry, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let expired: Vec<String> = self
            .leases
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        if !expired.is_empty() {
            log::info!("[CLEANUP] Found {} expired leases to clean up", expired.len());
        }

        let mut removed = 0;
        for key in expired {
            // Re-check under the shard lock: the key may have been re-acquired meanwhile.
            if let Some((key, entry)) = self.leases.remove_if(&key, |_, entry| entry.is_expired()) {
                log::info!(
                    "[EXPIRED CLEANUP] Removed expired lease - key: {}, token: {}",
                    key,
                    entry.value
                );
                removed += 1;
            }
        }
        removed
    }

    /// Runs [`cleanup_expired`](Self::cleanup_expired) every `interval` until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.cleanup_expired();
            }
        })
    }
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired() {
                    return Ok(false);
                }
                log::debug!(
                    "[EXPIRED] Lease lapsed, reclaiming - key: {}, old token: {}",
                    key,
                    occupied.get().value
                );
                occupied.insert(LeaseEntry::new(value, ttl));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LeaseEntry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let removed = self
            .leases
            .remove_if(key, |_, entry| entry.value == expected && !entry.is_expired());
        Ok(removed.is_some())
    }
}
