//! In-memory job queue.
//!
//! Jobs live in a map keyed by id; the ids of pending jobs are kept in a
//! FIFO so that claiming preserves submission order among due jobs. Every
//! status transition goes through this type and is checked against the
//! job's current status, so a job is never in two states at once.

use std::collections::{HashMap, VecDeque};
use mailq_sdk::objects::QueueStats;
use time::OffsetDateTime;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::entities::{Job, JobSpec, JobStatus};

#[derive(Default)]
struct QueueState {
    jobs: HashMap<Uuid, Job>,
    pending: VecDeque<Uuid>,
}

impl QueueState {
    fn transition(&mut self, id: Uuid, from: JobStatus, to: JobStatus) -> Option<&mut Job> {
        let job = self.jobs.get_mut(&id)?;
        if job.status != from {
            tracing::warn!(job = %id, current = %job.status, expected = %from, target = %to, "Rejected job transition");
            return None;
        }
        job.status = to;
        Some(job)
    }
}

#[derive(Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    work: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending job and wake the scheduler. Returns the new job.
    pub async fn enqueue(&self, spec: JobSpec, now: OffsetDateTime) -> Job {
        let job = Job::new(spec, now);
        self.push(job.clone()).await;
        job
    }

    /// Insert an already built pending job at the back of the FIFO and wake
    /// the scheduler. From here on the job may be claimed at any time.
    pub async fn push(&self, job: Job) {
        {
            let mut state = self.state.lock().await;
            state.pending.push_back(job.id);
            state.jobs.insert(job.id, job);
        }
        self.work.notify_one();
    }

    /// Take up to `limit` due jobs in FIFO order, mark them `sending` and
    /// count the attempt. Jobs not yet due keep their place.
    pub async fn claim_batch(&self, now: OffsetDateTime, limit: usize) -> Vec<Job> {
        let mut state = self.state.lock().await;
        let QueueState { jobs, pending } = &mut *state;
        let mut claimed = Vec::new();
        pending.retain(|id| {
            if claimed.len() >= limit {
                return true;
            }
            match jobs.get_mut(id) {
                Some(job) if job.is_due(now) => {
                    job.status = JobStatus::Sending;
                    job.attempts += 1;
                    claimed.push(job.clone());
                    false
                }
                Some(job) => job.status == JobStatus::Pending,
                None => false,
            }
        });
        claimed
    }

    pub async fn mark_sent(&self, id: Uuid, now: OffsetDateTime) -> Option<Job> {
        let mut state = self.state.lock().await;
        let job = state.transition(id, JobStatus::Sending, JobStatus::Sent)?;
        job.sent_at = Some(now);
        job.last_error = None;
        Some(job.clone())
    }

    /// Put a failed attempt back to `pending` without making it claimable.
    /// Call [`JobQueue::requeue`] once the retry delay has elapsed.
    pub async fn mark_retry(&self, id: Uuid, error: String) -> Option<Job> {
        let mut state = self.state.lock().await;
        let job = state.transition(id, JobStatus::Sending, JobStatus::Pending)?;
        job.last_error = Some(error);
        Some(job.clone())
    }

    /// Make a pending job claimable again, at the back of the FIFO.
    pub async fn requeue(&self, id: Uuid) -> bool {
        let requeued = {
            let mut state = self.state.lock().await;
            let is_pending = state
                .jobs
                .get(&id)
                .is_some_and(|job| job.status == JobStatus::Pending);
            if is_pending && !state.pending.contains(&id) {
                state.pending.push_back(id);
                true
            } else {
                false
            }
        };
        if requeued {
            self.work.notify_one();
        }
        requeued
    }

    pub async fn mark_failed(&self, id: Uuid, error: String) -> Option<Job> {
        let mut state = self.state.lock().await;
        let job = state.transition(id, JobStatus::Sending, JobStatus::Failed)?;
        job.last_error = Some(error);
        Some(job.clone())
    }

    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.state.lock().await.jobs.get(&id).cloned()
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let mut stats = QueueStats::default();
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Sending => stats.sending += 1,
                JobStatus::Sent => stats.sent += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Earliest `scheduled_for` among claimable jobs.
    pub async fn next_due(&self) -> Option<OffsetDateTime> {
        let state = self.state.lock().await;
        state
            .pending
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .map(|job| job.scheduled_for)
            .min()
    }

    /// Resolves after the next enqueue or requeue. A notification sent while
    /// nobody waits is kept for the next caller.
    pub async fn wait_for_work(&self) {
        self.work.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2030-01-01 12:00 UTC);

    fn spec(to: &str) -> JobSpec {
        JobSpec::text(&[to], "subject", "body")
    }

    #[tokio::test]
    async fn test_scheduled_job_is_claimed_only_when_due() {
        let queue = JobQueue::new();
        let due_at = T0 + Duration::from_secs(3600);
        let job = queue.enqueue(spec("a@example.com").scheduled_for(due_at), T0).await;

        assert!(queue.claim_batch(T0 + Duration::from_secs(1800), 10).await.is_empty());
        assert_eq!(queue.get(job.id).await.unwrap().status, JobStatus::Pending);
        assert_eq!(queue.next_due().await, Some(due_at));

        let claimed = queue.claim_batch(due_at, 10).await;
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, JobStatus::Sending);
        assert_eq!(claimed[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_claim_preserves_fifo_and_limit() {
        let queue = JobQueue::new();
        let later = queue
            .enqueue(spec("late@example.com").scheduled_for(T0 + Duration::from_secs(60)), T0)
            .await;
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(queue.enqueue(spec(&format!("u{i}@example.com")), T0).await.id);
        }

        let first: Vec<Uuid> = queue.claim_batch(T0, 3).await.iter().map(|j| j.id).collect();
        assert_eq!(first, ids[..3]);
        let second: Vec<Uuid> = queue.claim_batch(T0, 3).await.iter().map(|j| j.id).collect();
        assert_eq!(second, ids[3..]);
        assert_eq!(queue.next_due().await, Some(later.scheduled_for));
    }

    #[tokio::test]
    async fn test_retry_requires_requeue() {
        let queue = JobQueue::new();
        let job = queue.enqueue(spec("a@example.com"), T0).await;
        queue.claim_batch(T0, 1).await;

        let retried = queue.mark_retry(job.id, "timeout".into()).await.unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.last_error.as_deref(), Some("timeout"));
        assert!(queue.claim_batch(T0, 1).await.is_empty());

        assert!(queue.requeue(job.id).await);
        assert!(!queue.requeue(job.id).await);
        let again = queue.claim_batch(T0, 1).await;
        assert_eq!(again[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_invalid_transitions_are_rejected() {
        let queue = JobQueue::new();
        let job = queue.enqueue(spec("a@example.com"), T0).await;
        assert!(queue.mark_sent(job.id, T0).await.is_none());
        assert!(queue.mark_failed(job.id, "x".into()).await.is_none());

        queue.claim_batch(T0, 1).await;
        let sent = queue.mark_sent(job.id, T0).await.unwrap();
        assert_eq!(sent.sent_at, Some(T0));
        assert!(queue.mark_retry(job.id, "late".into()).await.is_none());
        assert!(!queue.requeue(job.id).await);
        assert!(queue.mark_sent(Uuid::nil(), T0).await.is_none());
    }

    #[tokio::test]
    async fn test_stats() {
        let queue = JobQueue::new();
        let a = queue.enqueue(spec("a@example.com"), T0).await;
        let b = queue.enqueue(spec("b@example.com"), T0).await;
        queue.enqueue(spec("c@example.com"), T0).await;
        queue.claim_batch(T0, 2).await;
        queue.mark_sent(a.id, T0).await;
        queue.mark_failed(b.id, "rejected".into()).await;

        let stats = queue.stats().await;
        assert_eq!(
            stats,
            QueueStats {
                pending: 1,
                sending: 0,
                sent: 1,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter() {
        let queue = std::sync::Arc::new(JobQueue::new());
        queue.enqueue(spec("a@example.com"), T0).await;
        tokio::time::timeout(Duration::from_secs(1), queue.wait_for_work())
            .await
            .unwrap();
    }
}
