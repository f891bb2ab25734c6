//! Configuration types for mailq.
//!
//! These are the validated runtime values shared across crates. Loading and
//! parsing the config file is handled by the server crate.

mod admission;
mod analytics;
mod config_store;
mod delivery;
mod smtp;

pub use admission::AdmissionPolicy;
pub use analytics::{AnalyticsConfig, SimulationConfig};
pub use config_store::ConfigStore;
pub use delivery::{RetryPolicy, SchedulerConfig};
pub use smtp::{SmtpConfig, SmtpTls};
