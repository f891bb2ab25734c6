//! Background processors.
//!
//! - `Scheduler`: claims due jobs in batches, hands them to the `Dispatcher`
//! - `Dispatcher`: sends one job, applies the outcome, emits `JobSent`
//! - `SimulatedEngagement`: receives `JobSent`, records engagement events
//! - `WebhookNotifier`: receives `Notification`, delivers signed webhooks

pub mod dispatcher;
pub mod engagement;
pub mod scheduler;
pub mod webhook_notifier;

pub use dispatcher::{DispatchOutcome, Dispatcher, FailureReason};
pub use engagement::SimulatedEngagement;
pub use scheduler::Scheduler;
pub use webhook_notifier::{DeliveryReport, WebhookError, WebhookNotifier};
