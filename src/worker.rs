use crate::clock::Stopwatch;
use crate::error::LockError;
use crate::mutex::LockManager;
use log::{error, info, warn};
use std::time::Duration;

/// What one worker run did.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// Ran the critical section. `released` is the unlock result: `Ok(false)` means the lease had
    /// already lapsed by the time the work finished.
    Ran {
        waited: Duration,
        released: Result<bool, LockError>,
    },
    /// Never got the lease; the work was skipped.
    Skipped(LockError),
}

impl WorkerOutcome {
    pub fn ran(&self) -> bool {
        matches!(self, WorkerOutcome::Ran { .. })
    }
}

fn log_status(worker: &str, label: &str, manager: &LockManager) {
    match serde_json::to_string(&manager.status()) {
        Ok(json) => info!("[{}] {}: {}", worker, label, json),
        Err(e) => warn!("[{}] {}: failed to render status: {}", worker, label, e),
    }
}

/// Acquires the lease, holds it for `hold` doing "work", then releases it.
///
/// A worker that cannot get the lease treats the work as not done by itself and skips it.
pub async fn run_worker(worker: &str, manager: &LockManager, hold: Duration) -> WorkerOutcome {
    let watch = Stopwatch::start();
    log_status(worker, "before lock", manager);

    let result = manager
        .run_exclusive(move || async move {
            let waited = watch.elapsed();
            log_status(worker, "locked", manager);
            info!("[{}] Begin after waiting for {:?}", worker, waited);
            tokio::time::sleep(hold).await;
            info!("[{}] Wake up after {:?}", worker, watch.elapsed());
            log_status(worker, "before unlock", manager);
            waited
        })
        .await;

    match result {
        Ok(done) => {
            match &done.released {
                Ok(true) => info!("[{}] Unlocked", worker),
                Ok(false) => warn!(
                    "[{}] Unlock found the lease already gone; work ran past expiry",
                    worker
                ),
                Err(e) => error!("[{}] Unlock failed: {}", worker, e),
            }
            log_status(worker, "after unlock", manager);
            WorkerOutcome::Ran {
                waited: done.output,
                released: done.released,
            }
        }
        Err(e) => {
            info!("[{}] Skipping work, lock not acquired: {}", worker, e);
            WorkerOutcome::Skipped(e)
        }
    }
}
