use std::time::Duration;
use tokio::time::Instant;

/// Upper bound for any wait or lease derived from caller input (about 30 years).
pub const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// `from + wait`, clamped to [`FAR_FUTURE`] so huge durations cannot overflow the clock.
pub fn deadline_after(from: Instant, wait: Duration) -> Instant {
    from.checked_add(wait.min(FAR_FUTURE))
        .unwrap_or_else(|| from + FAR_FUTURE)
}

/// Monotonic elapsed-time measurement on the tokio clock (virtual under paused test time).
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `budget` minus the elapsed time, or `None` once the budget is spent.
    pub fn remaining(&self, budget: Duration) -> Option<Duration> {
        budget.checked_sub(self.elapsed()).filter(|left| !left.is_zero())
    }
}
