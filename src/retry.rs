use crate::clock::deadline_after;
use std::time::Duration;
use tokio::time::Instant;

/// Hands out a bounded number of acquisition attempts separated by a fixed delay.
///
/// The first attempt is immediate; every later one is preceded by a sleep of `delay`. No sleep
/// follows the last attempt, so a fully exhausted schedule waits `(max_tries - 1) * delay`.
#[derive(Debug)]
pub struct RetryScheduler {
    max_tries: u32,
    delay: Duration,
    deadline: Option<Instant>,
    attempt: u32,
    deadline_reached: bool,
}

impl RetryScheduler {
    pub fn new(max_tries: u32, delay: Duration) -> Self {
        Self {
            max_tries: max_tries.max(1),
            delay,
            deadline: None,
            attempt: 0,
            deadline_reached: false,
        }
    }

    /// Stop handing out attempts once waiting for the next one would end past `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Waits as required and returns the 1-based number of the next attempt, or `None` when the
    /// schedule is exhausted.
    pub async fn next_attempt(&mut self) -> Option<u32> {
        if self.attempt >= self.max_tries || self.deadline_reached {
            return None;
        }

        if self.attempt > 0 {
            let wake_at = deadline_after(Instant::now(), self.delay);
            if let Some(deadline) = self.deadline {
                if wake_at > deadline {
                    self.deadline_reached = true;
                    return None;
                }
            }
            tokio::time::sleep_until(wake_at).await;
        } else if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.deadline_reached = true;
                return None;
            }
        }

        self.attempt += 1;
        Some(self.attempt)
    }

    /// Attempts handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Total sleep of a fully exhausted schedule, ignoring any deadline.
    pub fn max_wait(&self) -> Duration {
        self.delay.saturating_mul(self.max_tries - 1)
    }

    pub fn deadline_reached(&self) -> bool {
        self.deadline_reached
    }
}
