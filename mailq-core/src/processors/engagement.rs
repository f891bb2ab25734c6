//! Simulated engagement source.
//!
//! Stands in for real delivery receipts and tracking pixels when enabled:
//! every `JobSent` notice is turned into `delivered`, then maybe `opened`,
//! then maybe `clicked`, each after a random delay. The chain stops at the
//! first stage that does not happen.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::entities::{EventContext, EventType};
use crate::events::{JobSent, JobSentReceiver};
use crate::tracker::EventTracker;

pub struct SimulatedEngagement {
    tracker: Arc<EventTracker>,
    config: SimulationConfig,
}

impl SimulatedEngagement {
    pub fn new(tracker: Arc<EventTracker>, config: SimulationConfig) -> Self {
        Self { tracker, config }
    }

    pub async fn run(self, mut rx: JobSentReceiver, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Engagement simulation started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }

                Some(sent) = rx.recv() => {
                    let steps = plan(&self.config, &mut rand::rng());
                    debug!(job_id = %sent.job_id, steps = steps.len(), "Simulating engagement");
                    tokio::spawn(play(Arc::clone(&self.tracker), sent, steps));
                }

                else => break,
            }
        }

        info!("Engagement simulation shutdown complete");
    }
}

async fn play(tracker: Arc<EventTracker>, sent: JobSent, steps: Vec<(Duration, EventType)>) {
    for (delay, event) in steps {
        tokio::time::sleep(delay).await;
        tracker
            .record(sent.job_id, event, sent.recipient.clone(), EventContext::default())
            .await;
    }
}

/// Roll the engagement chain for one message.
///
/// Each entry is the delay since the previous step and the event to record.
pub fn plan<R: Rng + ?Sized>(
    config: &SimulationConfig,
    rng: &mut R,
) -> Vec<(Duration, EventType)> {
    let stages = [
        (EventType::Delivered, config.delivered),
        (EventType::Opened, config.opened),
        (EventType::Clicked, config.clicked),
    ];
    let mut steps = Vec::with_capacity(stages.len());
    for (event, probability) in stages {
        if !rng.random_bool(probability_of(probability)) {
            break;
        }
        steps.push((random_delay(config.max_delay, rng), event));
    }
    steps
}

fn probability_of(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

fn random_delay<R: Rng + ?Sized>(max: Duration, rng: &mut R) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rng.random_range(0..=max_ms))
}
