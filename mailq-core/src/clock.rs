use time::OffsetDateTime;
use tokio::time::Instant;

/// Wall-clock time derived from tokio's monotonic clock.
///
/// Anchored once at creation; afterwards it only moves forward and follows
/// tokio's paused test time.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall: OffsetDateTime,
    mono: Instant,
}

impl Clock {
    pub fn start() -> Self {
        Self {
            wall: OffsetDateTime::now_utc(),
            mono: Instant::now(),
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        self.wall + self.mono.elapsed()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_follows_paused_time() {
        let clock = Clock::start();
        let before = clock.now();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(clock.now() - before, time::Duration::hours(1));
    }
}
