use crate::clock::FAR_FUTURE;
use crate::error::LockError;
use crate::retry::RetryScheduler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(8);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_TRIES: u32 = 32;

/// Acquisition policy for a [`LockManager`](crate::mutex::LockManager).
///
/// Choosing `expiry`:
/// - periodic (cron-like) work should use an expiry slightly below the repeat interval, so the
///   previous cycle's lease is gone before the next cycle starts;
/// - work of unpredictable duration should use an expiry as high as tolerable and rely on an
///   explicit unlock, accepting that a crashed holder blocks the key until expiry.
///
/// The lease is never renewed. A critical section that outlives `expiry` runs without mutual
/// exclusion for the overrun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockOptions {
    pub expiry: Duration,
    pub retry_delay: Duration,
    pub max_tries: u32,
    /// Clock-skew correction for multi-replica quorum locking. Accepted but not applied.
    pub drift_factor: f64,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            expiry: DEFAULT_EXPIRY,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_tries: DEFAULT_MAX_TRIES,
            drift_factor: 0.0,
        }
    }
}

impl LockOptions {
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_drift_factor(mut self, drift_factor: f64) -> Self {
        self.drift_factor = drift_factor;
        self
    }

    /// Longest `lock()` can spend sleeping between attempts.
    pub fn max_wait(&self) -> Duration {
        RetryScheduler::new(self.max_tries, self.retry_delay).max_wait()
    }

    pub fn validate(&self) -> Result<(), LockError> {
        if self.max_tries == 0 {
            return Err(LockError::InvalidOptions(
                "max_tries must be at least 1".to_string(),
            ));
        }
        if self.expiry.is_zero() {
            return Err(LockError::InvalidOptions(
                "expiry must be greater than zero".to_string(),
            ));
        }
        if self.expiry > FAR_FUTURE || self.retry_delay > FAR_FUTURE {
            return Err(LockError::InvalidOptions(format!(
                "expiry and retry_delay must not exceed {:?}",
                FAR_FUTURE
            )));
        }
        if !self.drift_factor.is_finite() || self.drift_factor < 0.0 {
            return Err(LockError::InvalidOptions(format!(
                "drift_factor must be a non-negative number, got {}",
                self.drift_factor
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Unlocked,
    Held,
    /// Still held from this manager's point of view, but past its validity window; the store may
    /// already have handed the key to someone else.
    Expired,
}

/// Point-in-time view of a manager, for logging.
#[derive(Debug, Clone, Serialize)]
pub struct LockStatus {
    pub key: String,
    pub state: LockState,
    pub token: Option<String>,
    pub acquired_at: Option<DateTime<Utc>>,
    pub valid_for_ms: Option<u64>,
    pub expiry_ms: u64,
    pub max_tries: u32,
}
