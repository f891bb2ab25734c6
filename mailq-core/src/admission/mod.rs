//! Request admission: credential check, permission check, rate limiting.

mod credential;
mod gate;
mod rate_limit;

pub use credential::{ApiKey, CredentialError, KeyHash};
pub use gate::{Admission, AdmissionError, AdmissionGate, Caller, anonymous_permissions};
pub use rate_limit::{RateDecision, SlidingWindowLimiter};
