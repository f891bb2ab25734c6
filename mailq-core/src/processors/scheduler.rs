//! Scheduler processor.
//!
//! Drains the job queue in batches: claims up to `concurrency` due jobs,
//! dispatches them concurrently, pauses, and repeats. When nothing is due
//! it sleeps until the next enqueue, the next scheduled job, or
//! `idle_poll`, whichever comes first. The settings are re-read every
//! cycle so a reload takes effect without a restart.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info};

use super::dispatcher::{DispatchOutcome, Dispatcher};
use crate::clock::Clock;
use crate::config::{ConfigStore, SchedulerConfig};
use crate::queue::JobQueue;

pub struct Scheduler {
    queue: Arc<JobQueue>,
    dispatcher: Arc<Dispatcher>,
    config: ConfigStore<SchedulerConfig>,
    clock: Clock,
}

impl Scheduler {
    pub fn new(
        queue: Arc<JobQueue>,
        dispatcher: Arc<Dispatcher>,
        config: ConfigStore<SchedulerConfig>,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            config,
            clock: Clock::start(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Run until the shutdown signal fires. A batch in flight is finished
    /// before the loop exits.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Scheduler started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            let config = self.config.snapshot().await;
            let now = self.clock.now();
            let batch = self.queue.claim_batch(now, config.concurrency.max(1)).await;
            let idle = batch.is_empty();

            let wait = if idle {
                self.idle_wait(now, config.idle_poll).await
            } else {
                let size = batch.len();
                let outcomes =
                    join_all(batch.into_iter().map(|job| self.dispatcher.dispatch(job))).await;
                let sent = outcomes
                    .iter()
                    .filter(|o| matches!(o, DispatchOutcome::Sent))
                    .count();
                debug!(size, sent, "Batch dispatched");
                config.batch_pause
            };

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = self.queue.wait_for_work(), if idle => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
        info!("Scheduler shutdown complete");
    }

    /// Time until the next scheduled job, capped at `idle_poll`.
    async fn idle_wait(&self, now: OffsetDateTime, idle_poll: Duration) -> Duration {
        match self.queue.next_due().await {
            Some(due) => Duration::try_from(due - now)
                .unwrap_or(Duration::ZERO)
                .min(idle_poll),
            None => idle_poll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalyticsConfig, RetryPolicy};
    use crate::entities::{EventType, JobSpec, JobStatus};
    use crate::store::MemoryStore;
    use crate::tracker::{EventTracker, NoGeoLookup};
    use crate::transport::{CaptureTransport, MailTransport, TransportError};

    struct Harness {
        queue: Arc<JobQueue>,
        tracker: Arc<EventTracker>,
        transport: Arc<CaptureTransport>,
        clock: Clock,
        shutdown_tx: watch::Sender<bool>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(transport: CaptureTransport) -> Harness {
        let clock = Clock::start();
        let queue = Arc::new(JobQueue::new());
        let tracker = Arc::new(EventTracker::new(
            AnalyticsConfig::default(),
            Arc::new(NoGeoLookup),
            None,
        ));
        let transport = Arc::new(transport);
        let dyn_transport: Arc<dyn MailTransport> = transport.clone();
        let dispatcher = Dispatcher::new(
            queue.clone(),
            Some(dyn_transport),
            tracker.clone(),
            Arc::new(MemoryStore::new()),
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
        Harness {
            queue,
            tracker,
            transport,
            clock,
            shutdown_tx,
            handle,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_job_waits_for_its_time() {
        let h = start(CaptureTransport::new());
        let due = h.clock.now() + Duration::from_secs(3600);
        let job = h
            .queue
            .enqueue(JobSpec::text(&["a@example.com"], "later", "x").scheduled_for(due), h.clock.now())
            .await;

        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert_eq!(h.queue.get(job.id).await.unwrap().status, JobStatus::Pending);
        assert!(h.transport.attempts().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.queue.get(job.id).await.unwrap().status, JobStatus::Sent);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_linear_backoff_then_fails() {
        let transient = || Err(TransportError::Transient("connection reset".into()));
        let h = start(CaptureTransport::scripted([transient(), transient(), transient()]));
        let job = h
            .queue
            .enqueue(JobSpec::text(&["a@example.com"], "s", "t"), h.clock.now())
            .await;

        tokio::time::sleep(Duration::from_secs(30)).await;

        let attempts = h.transport.attempts();
        assert_eq!(attempts.len(), 3);
        let first_gap = attempts[1].1 - attempts[0].1;
        let second_gap = attempts[2].1 - attempts[1].1;
        assert!(first_gap >= Duration::from_secs(5) && first_gap < Duration::from_secs(6));
        assert!(second_gap >= Duration::from_secs(10) && second_gap < Duration::from_secs(11));

        let failed = h.queue.get(job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempts, 3);
        let events = h.tracker.events_for(job.id).await;
        assert_eq!(events.iter().filter(|e| e.event == EventType::Bounced).count(), 1);
        assert_eq!(events.iter().filter(|e| e.event == EventType::Sent).count(), 0);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_respect_concurrency() {
        let h = start(CaptureTransport::new());
        for i in 0..12 {
            h.queue
                .enqueue(JobSpec::text(&[&format!("u{i}@example.com")], "s", "t"), h.clock.now())
                .await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.transport.attempts().len(), 5);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.transport.attempts().len(), 10);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.queue.stats().await.sent, 12);

        h.shutdown_tx.send(true).unwrap();
        h.handle.await.unwrap();
    }
}
