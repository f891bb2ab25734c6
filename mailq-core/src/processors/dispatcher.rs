//! Delivers one claimed job and applies the outcome.
//!
//! The dispatcher is the only writer of post-claim job transitions and of
//! the `sent` and `bounced` lifecycle events:
//!
//! - success: `sent`, `sent_at` set, `sent` recorded, `JobSent` published
//! - transient failure with attempts left: back to `pending`, re-queued
//!   after `base_delay * attempts`
//! - anything else: `failed`, `bounced` recorded

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::RetryPolicy;
use crate::entities::{EventContext, EventType, Job};
use crate::events::{JobSent, JobSentSender};
use crate::queue::JobQueue;
use crate::store::HistorySink;
use crate::tracker::EventTracker;
use crate::transport::{MailTransport, TransportError};

/// Why a job ended up `failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("exhausted retries after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },
    #[error("rejected by relay: {0}")]
    Rejected(String),
    #[error("no mail transport configured")]
    TransportUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Retrying { delay: Duration },
    Failed(FailureReason),
    /// The job was not in `sending` any more; nothing was done.
    Skipped,
}

pub struct Dispatcher {
    queue: Arc<JobQueue>,
    transport: Option<Arc<dyn MailTransport>>,
    tracker: Arc<EventTracker>,
    history: Arc<dyn HistorySink>,
    retry: RetryPolicy,
    job_sent: Option<JobSentSender>,
    clock: Clock,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<JobQueue>,
        transport: Option<Arc<dyn MailTransport>>,
        tracker: Arc<EventTracker>,
        history: Arc<dyn HistorySink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            transport,
            tracker,
            history,
            retry,
            job_sent: None,
            clock: Clock::start(),
        }
    }

    /// Publish a [`JobSent`] notice for every delivered job.
    pub fn with_job_sent(mut self, sender: JobSentSender) -> Self {
        self.job_sent = Some(sender);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[tracing::instrument(skip_all, fields(job = %job.id, attempt = job.attempts))]
    pub async fn dispatch(&self, job: Job) -> DispatchOutcome {
        self.mirror(&job).await;

        let result = match &self.transport {
            Some(transport) => transport.send(&job).await,
            None => Err(TransportError::Unavailable),
        };

        match result {
            Ok(()) => self.on_sent(&job).await,
            Err(TransportError::Transient(error)) if self.retry.should_retry(job.attempts) => {
                self.on_retry(&job, error).await
            }
            Err(TransportError::Transient(error)) => {
                let reason = FailureReason::ExhaustedRetries {
                    attempts: job.attempts,
                    last_error: error,
                };
                self.on_failed(&job, reason).await
            }
            Err(TransportError::Permanent(error)) => {
                self.on_failed(&job, FailureReason::Rejected(error)).await
            }
            Err(TransportError::Unavailable) => {
                self.on_failed(&job, FailureReason::TransportUnavailable)
                    .await
            }
        }
    }

    async fn on_sent(&self, job: &Job) -> DispatchOutcome {
        let Some(sent) = self.queue.mark_sent(job.id, self.clock.now()).await else {
            return DispatchOutcome::Skipped;
        };
        tracing::info!(attempts = sent.attempts, "Email sent");

        // Engagement is accepted as soon as the job is `sent`; record `sent`
        // ahead of the history round-trip.
        let recipient = sent.primary_recipient().to_owned();
        self.tracker
            .record(sent.id, EventType::Sent, recipient.clone(), EventContext::default())
            .await;
        self.mirror(&sent).await;
        if let Some(job_sent) = &self.job_sent {
            let notice = JobSent {
                job_id: sent.id,
                recipient,
            };
            if job_sent.send(notice).await.is_err() {
                tracing::debug!("No engagement source is listening");
            }
        }
        DispatchOutcome::Sent
    }

    async fn on_retry(&self, job: &Job, error: String) -> DispatchOutcome {
        let delay = self.retry.delay_for(job.attempts);
        tracing::warn!(error = %error, retry_in = ?delay, "Send failed, will retry");
        let Some(pending) = self.queue.mark_retry(job.id, error).await else {
            return DispatchOutcome::Skipped;
        };
        self.mirror(&pending).await;

        let queue = Arc::clone(&self.queue);
        let id = job.id;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.requeue(id).await;
        });
        DispatchOutcome::Retrying { delay }
    }

    async fn on_failed(&self, job: &Job, reason: FailureReason) -> DispatchOutcome {
        tracing::error!(reason = %reason, "Email failed");
        let Some(failed) = self.queue.mark_failed(job.id, reason.to_string()).await else {
            return DispatchOutcome::Skipped;
        };
        self.mirror(&failed).await;
        self.tracker
            .record(
                failed.id,
                EventType::Bounced,
                failed.primary_recipient().to_owned(),
                EventContext::default(),
            )
            .await;
        DispatchOutcome::Failed(reason)
    }

    async fn mirror(&self, job: &Job) {
        if let Err(e) = self.history.update_status(job).await {
            tracing::warn!(error = %e, status = %job.status, "Failed to mirror job status");
        }
    }
}
