//! Sliding-window rate limiter keyed by principal or client address.
//!
//! Each key keeps the timestamps of its admitted requests that are still
//! inside the window. Denied requests are not recorded, so a caller that
//! keeps hammering does not push its own reset time further out.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the oldest request in the window expires.
    pub reset_at: OffsetDateTime,
}

impl RateDecision {
    /// Whole seconds until `reset_at`, at least one.
    pub fn retry_after_secs(&self, now: OffsetDateTime) -> u64 {
        let secs = (self.reset_at - now).as_seconds_f64().ceil();
        if secs < 1.0 { 1 } else { secs as u64 }
    }
}

#[derive(Default)]
pub struct SlidingWindowLimiter {
    windows: Mutex<HashMap<String, VecDeque<OffsetDateTime>>>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `key` at `now`.
    ///
    /// Requests strictly newer than `now - window` are in the window. The
    /// request is admitted and recorded when fewer than `max` are.
    pub async fn hit(
        &self,
        key: &str,
        max: u32,
        window: Duration,
        now: OffsetDateTime,
    ) -> RateDecision {
        let cutoff = now - window;
        let mut windows = self.windows.lock().await;
        let stamps = windows.entry(key.to_owned()).or_default();
        while stamps.front().is_some_and(|t| *t <= cutoff) {
            stamps.pop_front();
        }

        let in_window = u32::try_from(stamps.len()).unwrap_or(u32::MAX);
        if in_window >= max {
            let reset_at = stamps.front().map_or(now + window, |oldest| *oldest + window);
            return RateDecision {
                allowed: false,
                limit: max,
                remaining: 0,
                reset_at,
            };
        }

        stamps.push_back(now);
        let reset_at = stamps.front().map_or(now + window, |oldest| *oldest + window);
        RateDecision {
            allowed: true,
            limit: max,
            remaining: max - (in_window + 1),
            reset_at,
        }
    }

    /// Drop keys whose every request has left the window. Returns how many
    /// keys were removed.
    pub async fn sweep(&self, window: Duration, now: OffsetDateTime) -> usize {
        let cutoff = now - window;
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, stamps| stamps.back().is_some_and(|t| *t > cutoff));
        before - windows.len()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.lock().await.len()
    }
}
