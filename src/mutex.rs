use crate::clock::Stopwatch;
use crate::error::{LockError, StoreError};
use crate::models::{LockOptions, LockState, LockStatus};
use crate::retry::RetryScheduler;
use crate::storage::LeaseStore;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

pub type TokenGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// The acquisition this manager currently believes it holds.
#[derive(Debug)]
struct Lease {
    token: String,
    // Measured from the start of the winning attempt, so the local view of validity never
    // outlasts the store's.
    since: Stopwatch,
    acquired_at: DateTime<Utc>,
}

/// Result of [`LockManager::run_exclusive`]: what the critical section produced, and whether the
/// lease was still ours to release when it finished.
#[derive(Debug)]
pub struct Exclusive<T> {
    pub output: T,
    pub released: Result<bool, LockError>,
}

/// Lease-based mutex over one key of a shared [`LeaseStore`].
///
/// `lock` claims the key with a fresh token, retrying per [`LockOptions`]; `unlock` removes the
/// key only if it still carries that token. A manager handles one critical section at a time:
/// locking again before unlocking fails with [`LockError::AlreadyHeld`].
pub struct LockManager {
    key: String,
    options: LockOptions,
    store: Arc<dyn LeaseStore>,
    generate_token: TokenGenerator,
    lease: Mutex<Option<Lease>>,
}

impl LockManager {
    pub fn new(
        key: impl Into<String>,
        store: Arc<dyn LeaseStore>,
        options: LockOptions,
    ) -> Result<Self, LockError> {
        options.validate()?;
        let key = key.into();
        if options.drift_factor != 0.0 {
            warn!(
                "[CONFIG] drift_factor {} ignored for key {}: single-store leases apply no drift correction",
                options.drift_factor, key
            );
        }

        Ok(Self {
            key,
            options,
            store,
            generate_token: Arc::new(|| Uuid::new_v4().to_string()),
            lease: Mutex::new(None),
        })
    }

    /// Replaces the default random (UUID v4) token source.
    pub fn with_token_generator<G>(mut self, generator: G) -> Self
    where
        G: Fn() -> String + Send + Sync + 'static,
    {
        self.generate_token = Arc::new(generator);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    pub fn is_held(&self) -> bool {
        self.lease.lock().is_some()
    }

    /// Acquires the lease, retrying up to `max_tries` times `retry_delay` apart.
    pub async fn lock(&self) -> Result<(), LockError> {
        let scheduler = RetryScheduler::new(self.options.max_tries, self.options.retry_delay);
        self.acquire(scheduler).await
    }

    /// Single attempt, no waiting, whatever `max_tries` says.
    pub async fn try_lock(&self) -> Result<(), LockError> {
        let scheduler = RetryScheduler::new(1, self.options.retry_delay);
        self.acquire(scheduler).await
    }

    /// Like [`lock`](Self::lock), but stops retrying rather than sleep past `deadline`.
    pub async fn lock_with_deadline(&self, deadline: Instant) -> Result<(), LockError> {
        let scheduler = RetryScheduler::new(self.options.max_tries, self.options.retry_delay)
            .with_deadline(deadline);
        self.acquire(scheduler).await
    }

    async fn acquire(&self, mut scheduler: RetryScheduler) -> Result<(), LockError> {
        if self.is_held() {
            return Err(LockError::AlreadyHeld {
                key: self.key.clone(),
            });
        }

        let token = (self.generate_token)();
        let waiting = Stopwatch::start();
        let mut last_error: Option<StoreError> = None;
        // Set while a failed attempt may have left our token behind in the store.
        let mut unsettled = false;

        info!(
            "[ACQUIRE] Attempting to acquire lock - key: {}, expiry: {:?}, max_tries: {}, retry_delay: {:?}, max_wait: {:?}",
            self.key,
            self.options.expiry,
            scheduler.max_tries(),
            self.options.retry_delay,
            scheduler.max_wait()
        );

        while let Some(attempt) = scheduler.next_attempt().await {
            if unsettled {
                unsettled = !self.discard_ambiguous(&token).await;
            }
            let since = Stopwatch::start();
            match self
                .store
                .set_if_not_exists(&self.key, &token, self.options.expiry)
                .await
            {
                Ok(true) => {
                    *self.lease.lock() = Some(Lease {
                        token: token.clone(),
                        since,
                        acquired_at: Utc::now(),
                    });
                    info!(
                        "[ACQUIRE SUCCESS] Lock acquired - key: {}, token: {}, attempt: {}, waited: {:?}",
                        self.key,
                        token,
                        attempt,
                        waiting.elapsed()
                    );
                    return Ok(());
                }
                Ok(false) => {
                    debug!(
                        "[ACQUIRE DENIED] Lock held elsewhere - key: {}, attempt: {}/{}",
                        self.key,
                        attempt,
                        scheduler.max_tries()
                    );
                    last_error = None;
                }
                Err(err) => {
                    warn!(
                        "[ACQUIRE ERROR] Store call failed - key: {}, attempt: {}/{}, error: {}",
                        self.key,
                        attempt,
                        scheduler.max_tries(),
                        err
                    );
                    unsettled = !self.discard_ambiguous(&token).await;
                    last_error = Some(err);
                }
            }
        }

        let attempts = scheduler.attempts();
        info!(
            "[ACQUIRE FAILED] Giving up - key: {}, attempts: {}, waited: {:?}",
            self.key,
            attempts,
            waiting.elapsed()
        );

        if scheduler.deadline_reached() {
            return Err(LockError::DeadlineExceeded {
                key: self.key.clone(),
                attempts,
            });
        }
        match last_error {
            Some(err) => Err(LockError::Store(err)),
            None => Err(LockError::LockFailed {
                key: self.key.clone(),
                tries: attempts,
            }),
        }
    }

    /// A failed `SET` may still have landed; take the key back if it carries our token.
    ///
    /// Returns `false` when the cleanup call itself failed, in which case the caller tries again
    /// before its next attempt. Otherwise a landed write would deny every retry of this `lock()`.
    async fn discard_ambiguous(&self, token: &str) -> bool {
        match self.store.compare_and_delete(&self.key, token).await {
            Ok(true) => {
                debug!(
                    "[ACQUIRE ERROR] Removed write of failed attempt - key: {}",
                    self.key
                );
                true
            }
            Ok(false) => true,
            Err(err) => {
                debug!(
                    "[ACQUIRE ERROR] Cleanup after failed attempt also failed - key: {}, error: {}",
                    self.key, err
                );
                false
            }
        }
    }

    /// Releases the lease if the store still carries this manager's token.
    ///
    /// `Ok(false)` means the lease had already lapsed (and may belong to someone else now); the
    /// store is left untouched. Either way the manager is unlocked afterwards.
    pub async fn unlock(&self) -> Result<bool, LockError> {
        let lease = self.lease.lock().take();
        let lease = match lease {
            Some(lease) => lease,
            None => {
                warn!("[RELEASE] Unlock without a held lease - key: {}", self.key);
                return Ok(false);
            }
        };

        info!(
            "[RELEASE] Releasing lock - key: {}, token: {}, held for: {:?}",
            self.key,
            lease.token,
            lease.since.elapsed()
        );

        match self.store.compare_and_delete(&self.key, &lease.token).await {
            Ok(true) => {
                info!("[RELEASE SUCCESS] Lock released - key: {}", self.key);
                Ok(true)
            }
            Ok(false) => {
                warn!(
                    "[RELEASE MISMATCH] Lease expired before unlock - key: {}, token: {}, expiry: {:?}, held for: {:?}",
                    self.key,
                    lease.token,
                    self.options.expiry,
                    lease.since.elapsed()
                );
                Ok(false)
            }
            Err(err) => {
                error!("Failed to release lock {}: {}", self.key, err);
                Err(err.into())
            }
        }
    }

    /// Runs `critical` under the lease and always attempts to release afterwards, including when
    /// `critical` panics (the panic resumes once the release attempt is done).
    ///
    /// Fails without running `critical` if the lease cannot be acquired.
    pub async fn run_exclusive<F, Fut, T>(&self, critical: F) -> Result<Exclusive<T>, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.lock().await?;

        let outcome = AssertUnwindSafe(async move { critical().await })
            .catch_unwind()
            .await;
        let released = self.unlock().await;

        match outcome {
            Ok(output) => Ok(Exclusive { output, released }),
            Err(panic) => {
                if let Err(err) = &released {
                    error!(
                        "Critical section on {} panicked and release failed: {}",
                        self.key, err
                    );
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    pub fn status(&self) -> LockStatus {
        let lease = self.lease.lock();
        let (state, token, acquired_at, valid_for) = match &*lease {
            None => (LockState::Unlocked, None, None, None),
            Some(lease) => {
                let valid_for = lease.since.remaining(self.options.expiry);
                let state = if valid_for.is_some() {
                    LockState::Held
                } else {
                    LockState::Expired
                };
                (
                    state,
                    Some(lease.token.clone()),
                    Some(lease.acquired_at),
                    Some(valid_for.unwrap_or_default()),
                )
            }
        };

        LockStatus {
            key: self.key.clone(),
            state,
            token,
            acquired_at,
            valid_for_ms: valid_for.map(|left| left.as_millis() as u64),
            expiry_ms: self.options.expiry.as_millis() as u64,
            max_tries: self.options.max_tries,
        }
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.get_mut().as_ref() {
            warn!(
                "Lock manager for {} dropped while holding token {}; the lease lapses after {:?}",
                self.key, lease.token, self.options.expiry
            );
        }
    }
}
