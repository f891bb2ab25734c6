use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{MailTransport, TransportError};
use crate::entities::Job;

/// Transport that keeps messages instead of sending them.
///
/// Scripted results are consumed in order, one per send; once the script is
/// exhausted every send succeeds. Used for dry runs and in tests.
#[derive(Default)]
pub struct CaptureTransport {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    attempts: Mutex<Vec<(Uuid, Instant)>>,
    delivered: Mutex<Vec<Job>>,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(results: impl IntoIterator<Item = Result<(), TransportError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Every send attempt with the (tokio) instant it was made.
    pub fn attempts(&self) -> Vec<(Uuid, Instant)> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn delivered(&self) -> Vec<Job> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl MailTransport for CaptureTransport {
    async fn send(&self, job: &Job) -> Result<(), TransportError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push((job.id, Instant::now()));
        }
        let outcome = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(Ok(()));
        if outcome.is_ok() {
            tracing::info!(job = %job.id, to = ?job.to, subject = %job.subject, "Captured message");
            if let Ok(mut delivered) = self.delivered.lock() {
                delivered.push(job.clone());
            }
        }
        outcome
    }
}
