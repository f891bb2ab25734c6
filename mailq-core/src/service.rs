//! Operations behind the HTTP surface.
//!
//! `MailService` ties the queue, the tracker and the history sink together
//! so request handlers stay thin and every write goes through one place.

use mailq_sdk::objects::{AnalyticsSummary, QueueStats, TimeRange};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::entities::{AnalyticsEvent, EventContext, EventType, Job, JobSpec, JobStatus};
use crate::queue::JobQueue;
use crate::store::HistorySink;
use crate::tracker::EventTracker;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackError {
    #[error("job not found: {0}")]
    UnknownJob(Uuid),
    /// Engagement can only follow a successful send.
    #[error("job {id} is {status}, not sent")]
    NotSent { id: Uuid, status: JobStatus },
    #[error("{0} events are recorded by the dispatcher only")]
    LifecycleEvent(EventType),
}

pub struct MailService {
    queue: Arc<JobQueue>,
    tracker: Arc<EventTracker>,
    history: Arc<dyn HistorySink>,
    clock: Clock,
}

impl MailService {
    pub fn new(
        queue: Arc<JobQueue>,
        tracker: Arc<EventTracker>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self {
            queue,
            tracker,
            history,
            clock: Clock::start(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Queue a validated submission. A failed history write is logged and
    /// does not reject the job.
    ///
    /// The history row is written before the job becomes claimable, so the
    /// dispatcher's status updates always find it.
    pub async fn submit(&self, spec: JobSpec) -> Job {
        let job = Job::new(spec, self.clock.now());
        if let Err(e) = self.history.record_history(&job).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to record job history");
        }
        self.queue.push(job.clone()).await;
        tracing::info!(
            job_id = %job.id,
            recipients = job.to.len() + job.cc.len() + job.bcc.len(),
            scheduled_for = %job.scheduled_for,
            "Email queued"
        );
        job
    }

    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.queue.get(id).await
    }

    pub async fn stats(&self) -> QueueStats {
        self.queue.stats().await
    }

    pub async fn analytics(&self, range: TimeRange) -> AnalyticsSummary {
        self.tracker.aggregate_at(range, self.clock.now()).await
    }

    /// Record an engagement event reported from outside.
    pub async fn track(
        &self,
        job_id: Uuid,
        event: EventType,
        recipient: Option<String>,
        context: EventContext,
    ) -> Result<AnalyticsEvent, TrackError> {
        if event.is_lifecycle() {
            return Err(TrackError::LifecycleEvent(event));
        }
        let job = self
            .queue
            .get(job_id)
            .await
            .ok_or(TrackError::UnknownJob(job_id))?;
        if job.status != JobStatus::Sent {
            return Err(TrackError::NotSent {
                id: job_id,
                status: job.status,
            });
        }
        let recipient = recipient.unwrap_or_else(|| job.primary_recipient().to_owned());
        Ok(self
            .tracker
            .record_at(job_id, event, recipient, context, self.clock.now())
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalyticsConfig, ConfigStore, RetryPolicy, SchedulerConfig};
    use crate::processors::{Dispatcher, Scheduler};
    use crate::store::{MemoryStore, StoreError};
    use crate::tracker::NoGeoLookup;
    use std::time::Duration;
    use tokio::sync::watch;

    struct Fixture {
        service: MailService,
        queue: Arc<JobQueue>,
        history: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(JobQueue::new());
        let history = Arc::new(MemoryStore::new());
        let tracker = Arc::new(EventTracker::new(
            AnalyticsConfig::default(),
            Arc::new(NoGeoLookup),
            None,
        ));
        Fixture {
            service: MailService::new(queue.clone(), tracker, history.clone()),
            queue,
            history,
        }
    }

    async fn sent_job(f: &Fixture) -> Job {
        let job = f
            .service
            .submit(JobSpec::text(&["a@example.com", "b@example.com"], "s", "t"))
            .await;
        let now = f.service.clock.now();
        f.queue.claim_batch(now, 1).await;
        f.queue.mark_sent(job.id, now).await.unwrap()
    }

    #[tokio::test]
    async fn test_submit_queues_and_records_history() {
        let f = fixture();
        let job = f.service.submit(JobSpec::text(&["a@example.com"], "s", "t")).await;
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(f.service.get(job.id).await.unwrap().id, job.id);
        assert_eq!(f.history.history(job.id).await.unwrap().id, job.id);
        assert_eq!(f.service.stats().await.pending, 1);
    }

    #[tokio::test]
    async fn test_track_rejections() {
        let f = fixture();
        let unknown = Uuid::now_v7();
        assert_eq!(
            f.service
                .track(unknown, EventType::Opened, None, EventContext::default())
                .await,
            Err(TrackError::UnknownJob(unknown))
        );

        let pending = f.service.submit(JobSpec::text(&["a@example.com"], "s", "t")).await;
        assert!(matches!(
            f.service
                .track(pending.id, EventType::Opened, None, EventContext::default())
                .await,
            Err(TrackError::NotSent {
                status: JobStatus::Pending,
                ..
            })
        ));

        let sent = sent_job(&f).await;
        for event in [EventType::Sent, EventType::Bounced] {
            assert_eq!(
                f.service
                    .track(sent.id, event, None, EventContext::default())
                    .await,
                Err(TrackError::LifecycleEvent(event))
            );
        }
    }

    #[tokio::test]
    async fn test_track_defaults_recipient_and_counts() {
        let f = fixture();
        let sent = sent_job(&f).await;
        let event = f
            .service
            .track(sent.id, EventType::Opened, None, EventContext::default())
            .await
            .unwrap();
        assert_eq!(event.recipient, "a@example.com");

        let clicked = f
            .service
            .track(
                sent.id,
                EventType::Clicked,
                Some("b@example.com".into()),
                EventContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(clicked.recipient, "b@example.com");

        let summary = f.service.analytics(TimeRange::Week).await;
        assert_eq!(summary.counts.opened, 1);
        assert_eq!(summary.counts.clicked, 1);
    }

    /// History backend whose inserts take a while, like a remote database.
    struct SlowHistory(MemoryStore);

    #[async_trait::async_trait]
    impl HistorySink for SlowHistory {
        async fn record_history(&self, job: &Job) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.0.record_history(job).await
        }

        async fn update_status(&self, job: &Job) -> Result<(), StoreError> {
            self.0.update_status(job).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_follows_dispatch_with_slow_insert() {
        let clock = Clock::start();
        let queue = Arc::new(JobQueue::new());
        let history = Arc::new(SlowHistory(MemoryStore::new()));
        let tracker = Arc::new(EventTracker::new(
            AnalyticsConfig::default(),
            Arc::new(NoGeoLookup),
            None,
        ));
        let dispatcher = Dispatcher::new(
            queue.clone(),
            None,
            tracker.clone(),
            history.clone(),
            RetryPolicy::default(),
        )
        .with_clock(clock);
        let scheduler = Scheduler::new(
            queue.clone(),
            Arc::new(dispatcher),
            ConfigStore::new(SchedulerConfig::default()),
        )
        .with_clock(clock);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        let service = MailService::new(queue.clone(), tracker, history.clone()).with_clock(clock);
        let job = service.submit(JobSpec::text(&["a@example.com"], "s", "t")).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(queue.get(job.id).await.unwrap().status, JobStatus::Failed);
        let recorded = history.0.history(job.id).await.unwrap();
        assert_eq!(recorded.status, JobStatus::Failed);
        assert_eq!(recorded.attempts, 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
