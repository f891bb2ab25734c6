//! Channels connecting the background processors.
//!
//! # Event Flow
//!
//! 1. `Scheduler` claims due jobs and hands them to the `Dispatcher`
//! 2. `Dispatcher` records `sent`/`bounced` with the `EventTracker` and emits `JobSent`
//! 3. `JobSent` -> engagement source, which records `delivered`/`opened`/`clicked`
//! 4. `EventTracker` emits a `Notification` per recorded event -> `WebhookNotifier`

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, JobSentReceiver, JobSentSender, NotificationReceiver,
    NotificationSender, job_sent_channel, notification_channel,
};

pub use types::{JobSent, Notification};
