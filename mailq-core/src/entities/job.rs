use bytes::Bytes;
use mailq_sdk::objects::{JobResponse, JobStatus as SdkJobStatus};
use time::OffsetDateTime;
use uuid::Uuid;

/// Job status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `mailq_sdk::objects::JobStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "job_status")]
pub enum JobStatusRecord {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl From<JobStatusRecord> for SdkJobStatus {
    fn from(value: JobStatusRecord) -> Self {
        match value {
            JobStatusRecord::Pending => SdkJobStatus::Pending,
            JobStatusRecord::Sending => SdkJobStatus::Sending,
            JobStatusRecord::Sent => SdkJobStatus::Sent,
            JobStatusRecord::Failed => SdkJobStatus::Failed,
        }
    }
}

impl From<SdkJobStatus> for JobStatusRecord {
    fn from(value: SdkJobStatus) -> Self {
        match value {
            SdkJobStatus::Pending => JobStatusRecord::Pending,
            SdkJobStatus::Sending => JobStatusRecord::Sending,
            SdkJobStatus::Sent => JobStatusRecord::Sent,
            SdkJobStatus::Failed => JobStatusRecord::Failed,
        }
    }
}

/// A decoded attachment, ready to be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Bytes,
}

/// Message body. At least one of the two parts is present once validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailBody {
    pub text: Option<String>,
    pub html: Option<String>,
}

/// A validated submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: EmailBody,
    pub attachments: Vec<Attachment>,
    pub scheduled_for: Option<OffsetDateTime>,
}

impl JobSpec {
    /// Plain-text message to the given recipients, mostly for tests and tooling.
    pub fn text(to: &[&str], subject: &str, text: &str) -> Self {
        Self {
            to: to.iter().map(|s| (*s).to_owned()).collect(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.to_owned(),
            body: EmailBody {
                text: Some(text.to_owned()),
                html: None,
            },
            attachments: Vec::new(),
            scheduled_for: None,
        }
    }

    pub fn scheduled_for(mut self, at: OffsetDateTime) -> Self {
        self.scheduled_for = Some(at);
        self
    }
}

/// One outbound email and its delivery state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: Uuid,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: EmailBody,
    pub attachments: Vec<Attachment>,
    pub status: SdkJobStatus,
    /// Send attempts made so far.
    pub attempts: u32,
    pub scheduled_for: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub sent_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

impl Job {
    /// Create a pending job. A missing or past schedule means "now".
    pub fn new(spec: JobSpec, now: OffsetDateTime) -> Self {
        let scheduled_for = spec.scheduled_for.map_or(now, |at| at.max(now));
        Self {
            id: Uuid::now_v7(),
            to: spec.to,
            cc: spec.cc,
            bcc: spec.bcc,
            subject: spec.subject,
            body: spec.body,
            attachments: spec.attachments,
            status: SdkJobStatus::Pending,
            attempts: 0,
            scheduled_for,
            created_at: now,
            sent_at: None,
            last_error: None,
        }
    }

    /// Address reported on lifecycle events for this job.
    pub fn primary_recipient(&self) -> &str {
        self.to.first().map(String::as_str).unwrap_or_default()
    }

    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.status == SdkJobStatus::Pending && self.scheduled_for <= now
    }

    pub fn to_response(&self) -> JobResponse {
        JobResponse {
            id: self.id,
            status: self.status,
            attempts: self.attempts,
            scheduled_for: self.scheduled_for,
            created_at: self.created_at,
            sent_at: self.sent_at,
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_past_schedule_is_clamped_to_now() {
        let now = datetime!(2030-01-01 12:00 UTC);
        let spec = JobSpec::text(&["a@example.com"], "hi", "body")
            .scheduled_for(datetime!(2029-12-31 00:00 UTC));
        let job = Job::new(spec, now);
        assert_eq!(job.scheduled_for, now);
        assert_eq!(job.status, SdkJobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.is_due(now));
    }

    #[test]
    fn test_future_schedule_is_kept() {
        let now = datetime!(2030-01-01 12:00 UTC);
        let later = datetime!(2030-01-01 13:00 UTC);
        let job = Job::new(JobSpec::text(&["a@example.com"], "hi", "x").scheduled_for(later), now);
        assert_eq!(job.scheduled_for, later);
        assert!(!job.is_due(now));
        assert!(job.is_due(later));
    }
}
