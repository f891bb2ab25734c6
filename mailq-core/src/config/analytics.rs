//! Analytics and engagement simulation settings.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyticsConfig {
    /// Days of events kept in memory. Must cover the longest query range.
    pub retention_days: u16,
    /// Entries kept in the geography and device breakdowns.
    pub top_n: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            top_n: 10,
        }
    }
}

/// Probabilities used by the simulated engagement source.
///
/// Each stage is only rolled when the previous one happened: a message has
/// to be delivered before it can be opened, and opened before it is clicked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub delivered: f64,
    pub opened: f64,
    pub clicked: f64,
    /// Upper bound of the random delay before each simulated event.
    pub max_delay: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            delivered: 0.95,
            opened: 0.4,
            clicked: 0.25,
            max_delay: Duration::from_secs(30),
        }
    }
}
