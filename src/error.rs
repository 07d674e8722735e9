use redis::{ErrorKind, RedisError};
use thiserror::Error;

/// Failure reported by a [`LeaseStore`](crate::storage::LeaseStore) backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached (connection refused, dropped, timed out, I/O).
    #[error("lease store unavailable: {0}")]
    Unavailable(String),

    /// The store answered, but with something other than a usable reply.
    #[error("lease store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.kind() == ErrorKind::IoError
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    /// The store call itself failed, unreachable or otherwise.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to acquire lock on {key} after {tries} tries")]
    LockFailed { key: String, tries: u32 },

    #[error("deadline reached while acquiring lock on {key} after {attempts} attempts")]
    DeadlineExceeded { key: String, attempts: u32 },

    #[error("lock on {key} is already held by this manager")]
    AlreadyHeld { key: String },

    #[error("invalid lock options: {0}")]
    InvalidOptions(String),
}

impl LockError {
    /// True when the lease was denied (another holder owns it), as opposed to the store failing.
    pub fn is_denied(&self) -> bool {
        matches!(
            self,
            LockError::LockFailed { .. } | LockError::DeadlineExceeded { .. }
        )
    }
}
