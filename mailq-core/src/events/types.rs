//! Messages passed between the background processors.

use uuid::Uuid;

use crate::entities::AnalyticsEvent;

/// Emitted by the dispatcher after the transport accepted a job.
///
/// Engagement sources subscribe to this to know which jobs may receive
/// `delivered`, `opened` and `clicked` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSent {
    pub job_id: Uuid,
    pub recipient: String,
}

/// A recorded event that has to be fanned out to webhook subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event: AnalyticsEvent,
}
