//! Lease-based distributed mutex.
//!
//! Independent processes coordinate over one key of a shared atomic store: the winner writes a
//! random token with a TTL (`SET NX`), and only the holder of that token may delete it. A crashed
//! holder blocks others for at most the lease expiry.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod mutex;
pub mod retry;
pub mod scenario;
pub mod storage;
pub mod worker;

pub use error::{LockError, StoreError};
pub use models::{LockOptions, LockState, LockStatus};
pub use mutex::{Exclusive, LockManager};
pub use storage::memory::MemoryStore;
pub use storage::redis::RedisStore;
pub use storage::LeaseStore;
