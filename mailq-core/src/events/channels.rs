//! Event channel factories and handles.

use super::types::{JobSent, Notification};
use tokio::sync::mpsc;

/// Buffer size for event channels. Senders wait when it is full.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

pub type JobSentSender = mpsc::Sender<JobSent>;
pub type JobSentReceiver = mpsc::Receiver<JobSent>;

pub type NotificationSender = mpsc::Sender<Notification>;
pub type NotificationReceiver = mpsc::Receiver<Notification>;

/// Dispatcher → engagement source.
pub fn job_sent_channel() -> (JobSentSender, JobSentReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Event tracker → webhook notifier.
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
