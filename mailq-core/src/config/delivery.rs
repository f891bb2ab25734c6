//! Scheduler and retry configuration.

use std::time::Duration;

/// How the scheduler drains the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on jobs dispatched in parallel per batch.
    pub concurrency: usize,
    /// Pause between two non-empty batches.
    pub batch_pause: Duration,
    /// Longest sleep while nothing is due.
    pub idle_poll: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            batch_pause: Duration::from_millis(100),
            idle_poll: Duration::from_secs(1),
        }
    }
}

/// Linear backoff: the n-th retry waits `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total send attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Whether a job that has made `attempts` attempts may try again.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the attempt that follows attempt number `attempts`.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        self.base_delay.saturating_mul(attempts.max(1))
    }
}
