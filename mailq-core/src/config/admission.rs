//! Admission policy.

use std::time::Duration;

/// Rules applied by the admission gate before any handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Admit callers without a credential, limited per client address.
    pub public_access: bool,
    /// Length of the sliding rate-limit window.
    pub window: Duration,
    /// Requests per window allowed for each anonymous client address.
    pub public_rate_limit: u32,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            public_access: false,
            window: Duration::from_secs(60),
            public_rate_limit: 60,
        }
    }
}
