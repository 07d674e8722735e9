use crate::models::{LockOptions, DEFAULT_RETRY_DELAY};
use std::time::Duration;

/// A named combination of lease policy and critical-section length used to exercise the mutex.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: &'static str,
    pub expiry: Duration,
    /// How long a worker stays inside its critical section.
    pub hold: Duration,
    pub tries: u32,
}

impl Scenario {
    /// The stock scenarios, indexed by the `SCENARIO` setting.
    ///
    /// All use the default 500ms retry delay, so a waiter gives up after roughly
    /// `tries * 500ms`.
    pub fn catalog() -> Vec<Scenario> {
        vec![
            // Each worker waits for the previous one.
            Scenario {
                name: "mutual waiting",
                expiry: Duration::from_secs(5),
                hold: Duration::from_secs(15),
                tries: 32,
            },
            // tries 20 * 500ms = 10s of waiting: late starters run out of tries.
            Scenario {
                name: "waiters run out of tries",
                expiry: Duration::from_secs(5),
                hold: Duration::from_secs(15),
                tries: 20,
            },
            Scenario {
                name: "hold shorter than expiry",
                expiry: Duration::from_secs(15),
                hold: Duration::from_secs(2),
                tries: 32,
            },
            // Cron de-duplication: one worker runs, the rest skip. Expiry sits just below the
            // cycle length so the next cycle never sees a stale lease.
            Scenario {
                name: "single winner",
                expiry: Duration::from_secs(13),
                hold: Duration::from_secs(15),
                tries: 1,
            },
        ]
    }

    pub fn by_index(index: usize) -> Option<Scenario> {
        Self::catalog().into_iter().nth(index)
    }

    pub fn options(&self) -> LockOptions {
        LockOptions::default()
            .with_expiry(self.expiry)
            .with_retry_delay(DEFAULT_RETRY_DELAY)
            .with_tries(self.tries)
            .with_drift_factor(0.0)
    }
}
