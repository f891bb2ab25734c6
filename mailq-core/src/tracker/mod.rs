//! Event log and analytics aggregation.
//!
//! Every recorded event is appended to a log and counted in a per-day
//! counter, then handed to the webhook notifier. Both are pruned to the
//! retention window on each write. Aggregation holds the read lock for the
//! whole computation so one summary never mixes two states.

mod device;
mod geo;

pub use device::classify_device;
pub use geo::{GeoLocation, GeoLookup, NoGeoLookup, StaticGeoLookup};

use itertools::Itertools;
use mailq_sdk::objects::{
    AnalyticsSummary, DailyPoint, EventCounts, EventMetadata, Rates, Segment, TimeRange,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use time::{Date, Duration, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::AnalyticsConfig;
use crate::entities::{AnalyticsEvent, EventContext, EventType};
use crate::events::{Notification, NotificationSender};

#[derive(Default)]
struct TrackerState {
    log: VecDeque<AnalyticsEvent>,
    daily: BTreeMap<Date, EventCounts>,
}

impl TrackerState {
    fn prune(&mut self, oldest_kept: Date) {
        while self
            .log
            .front()
            .is_some_and(|e| e.timestamp.date() < oldest_kept)
        {
            self.log.pop_front();
        }
        self.daily = self.daily.split_off(&oldest_kept);
    }
}

pub struct EventTracker {
    state: RwLock<TrackerState>,
    geo: Arc<dyn GeoLookup>,
    notifier: Option<NotificationSender>,
    config: AnalyticsConfig,
}

impl EventTracker {
    pub fn new(
        config: AnalyticsConfig,
        geo: Arc<dyn GeoLookup>,
        notifier: Option<NotificationSender>,
    ) -> Self {
        Self {
            state: RwLock::new(TrackerState::default()),
            geo,
            notifier,
            config,
        }
    }

    pub async fn record(
        &self,
        job_id: Uuid,
        event: EventType,
        recipient: String,
        context: EventContext,
    ) -> AnalyticsEvent {
        self.record_at(job_id, event, recipient, context, OffsetDateTime::now_utc())
            .await
    }

    pub async fn record_at(
        &self,
        job_id: Uuid,
        event: EventType,
        recipient: String,
        context: EventContext,
        now: OffsetDateTime,
    ) -> AnalyticsEvent {
        let location = match context.ip_address {
            Some(ip) => self.geo.lookup(ip).await,
            None => None,
        };
        let metadata = EventMetadata {
            device: context.user_agent.as_deref().map(classify_device),
            user_agent: context.user_agent,
            ip_address: context.ip_address,
            country: location.as_ref().map(|l| l.country.clone()),
            city: location.and_then(|l| l.city),
        };
        let recorded = AnalyticsEvent {
            id: Uuid::now_v7(),
            job_id,
            event,
            recipient,
            timestamp: now,
            metadata,
        };

        {
            let mut state = self.state.write().await;
            state.log.push_back(recorded.clone());
            state
                .daily
                .entry(now.date())
                .or_default()
                .bump(event);
            let oldest_kept = now
                .date()
                .saturating_sub(Duration::days(i64::from(self.config.retention_days) - 1));
            state.prune(oldest_kept);
        }
        tracing::debug!(job = %job_id, %event, "Recorded event");

        if let Some(notifier) = &self.notifier {
            let notification = Notification {
                event: recorded.clone(),
            };
            if notifier.send(notification).await.is_err() {
                tracing::warn!(event = %recorded.id, "Webhook notifier is gone, event not fanned out");
            }
        }
        recorded
    }

    pub async fn aggregate(&self, range: TimeRange) -> AnalyticsSummary {
        self.aggregate_at(range, OffsetDateTime::now_utc()).await
    }

    /// Summary over the `range.days()` UTC days ending with `now`'s day.
    pub async fn aggregate_at(&self, range: TimeRange, now: OffsetDateTime) -> AnalyticsSummary {
        let today = now.date();
        let days = i64::from(range.days());
        let first = today.saturating_sub(Duration::days(days - 1));
        let state = self.state.read().await;

        let time_series: Vec<DailyPoint> = (0..days)
            .map(|offset| {
                let date = first.saturating_add(Duration::days(offset));
                DailyPoint {
                    date,
                    counts: state.daily.get(&date).copied().unwrap_or_default(),
                }
            })
            .collect();
        let mut counts = EventCounts::default();
        for point in &time_series {
            counts.add(&point.counts);
        }

        let in_range = || {
            state.log.iter().filter(move |e| {
                let date = e.timestamp.date();
                date >= first && date <= today
            })
        };
        let geography = breakdown(
            in_range().filter_map(|e| e.metadata.country.clone()),
            self.config.top_n,
        );
        let devices = breakdown(
            in_range().filter_map(|e| e.metadata.device.map(|d| d.as_str().to_owned())),
            self.config.top_n,
        );

        AnalyticsSummary {
            range,
            rates: Rates {
                delivery_rate: rate(counts.delivered, counts.sent),
                open_rate: rate(counts.opened, counts.delivered),
                click_rate: rate(counts.clicked, counts.delivered),
                bounce_rate: rate(counts.bounced, counts.sent),
            },
            counts,
            time_series,
            geography,
            devices,
        }
    }

    /// Events recorded for one job, oldest first.
    pub async fn events_for(&self, job_id: Uuid) -> Vec<AnalyticsEvent> {
        let state = self.state.read().await;
        state
            .log
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }
}

/// Percentage rounded to two decimals, 0 when `denominator` is 0.
fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 10_000.0).round() / 100.0
}

/// Percentage floored to two decimals, so a breakdown never sums past 100.
fn floored_share(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (u128::from(part) * 10_000 / u128::from(total)) as f64 / 100.0
}

fn breakdown(labels: impl Iterator<Item = String>, top_n: usize) -> Vec<Segment> {
    let counts = labels.counts();
    let total = counts.values().sum::<usize>() as u64;
    counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .take(top_n)
        .map(|(label, count)| Segment {
            label,
            count: count as u64,
            percentage: floored_share(count as u64, total),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::notification_channel;
    use mailq_sdk::objects::DeviceClass;
    use std::collections::HashMap;
    use std::net::IpAddr;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2030-06-15 12:00 UTC);

    fn tracker() -> EventTracker {
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let geo = StaticGeoLookup::new(HashMap::from([(
            ip,
            GeoLocation {
                country: "DE".into(),
                city: Some("Berlin".into()),
            },
        )]));
        EventTracker::new(AnalyticsConfig::default(), Arc::new(geo), None)
    }

    async fn record(tracker: &EventTracker, event: EventType, at: OffsetDateTime, ua: Option<&str>, ip: Option<&str>) {
        let context = EventContext {
            user_agent: ua.map(str::to_owned),
            ip_address: ip.map(|s| s.parse().unwrap()),
        };
        tracker
            .record_at(Uuid::nil(), event, "a@example.com".into(), context, at)
            .await;
    }

    #[tokio::test]
    async fn test_empty_week() {
        let summary = tracker().aggregate_at(TimeRange::Week, NOW).await;
        assert_eq!(summary.counts, EventCounts::default());
        assert_eq!(summary.rates.delivery_rate, 0.0);
        assert_eq!(summary.rates.open_rate, 0.0);
        assert_eq!(summary.rates.click_rate, 0.0);
        assert_eq!(summary.rates.bounce_rate, 0.0);
        assert_eq!(summary.time_series.len(), 7);
        assert!(summary.time_series.iter().all(|p| p.counts.total() == 0));
        assert_eq!(summary.time_series[6].date, NOW.date());
        assert!(summary.geography.is_empty());
        assert!(summary.devices.is_empty());
    }

    #[tokio::test]
    async fn test_counts_rates_and_series() {
        let tracker = tracker();
        for _ in 0..3 {
            record(&tracker, EventType::Sent, NOW, None, None).await;
        }
        record(&tracker, EventType::Bounced, NOW, None, None).await;
        record(&tracker, EventType::Delivered, NOW, None, None).await;
        record(&tracker, EventType::Delivered, NOW - Duration::days(1), None, None).await;
        record(&tracker, EventType::Opened, NOW, None, None).await;
        // outside the 7 day range
        record(&tracker, EventType::Sent, NOW - Duration::days(10), None, None).await;

        let summary = tracker.aggregate_at(TimeRange::Week, NOW).await;
        assert_eq!(summary.counts.sent, 3);
        assert_eq!(summary.counts.delivered, 2);
        assert_eq!(summary.rates.delivery_rate, 66.67);
        assert_eq!(summary.rates.open_rate, 50.0);
        assert_eq!(summary.rates.click_rate, 0.0);
        assert_eq!(summary.rates.bounce_rate, 33.33);
        assert_eq!(summary.time_series[5].counts.delivered, 1);
        assert_eq!(summary.time_series[6].counts.sent, 3);

        let month = tracker.aggregate_at(TimeRange::Month, NOW).await;
        assert_eq!(month.counts.sent, 4);
        assert_eq!(month.time_series.len(), 30);
    }

    #[tokio::test]
    async fn test_breakdowns() {
        let tracker = tracker();
        let phone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)";
        let desktop = "Mozilla/5.0 (X11; Linux x86_64)";
        record(&tracker, EventType::Opened, NOW, Some(phone), Some("203.0.113.7")).await;
        record(&tracker, EventType::Opened, NOW, Some(phone), Some("198.51.100.1")).await;
        record(&tracker, EventType::Clicked, NOW, Some(desktop), None).await;

        let summary = tracker.aggregate_at(TimeRange::Week, NOW).await;
        assert_eq!(summary.geography.len(), 1);
        assert_eq!(summary.geography[0].label, "DE");
        assert_eq!(summary.geography[0].percentage, 100.0);

        assert_eq!(summary.devices[0].label, DeviceClass::Mobile.as_str());
        assert_eq!(summary.devices[0].count, 2);
        assert_eq!(summary.devices[0].percentage, 66.66);
        assert_eq!(summary.devices[1].percentage, 33.33);
        let sum: f64 = summary.devices.iter().map(|s| s.percentage).sum();
        assert!(sum <= 100.0);
    }

    #[tokio::test]
    async fn test_metadata_resolved_at_record_time() {
        let tracker = tracker();
        record(&tracker, EventType::Opened, NOW, Some("Some iPad"), Some("203.0.113.7")).await;
        let events = tracker.events_for(Uuid::nil()).await;
        let meta = &events[0].metadata;
        assert_eq!(meta.device, Some(DeviceClass::Tablet));
        assert_eq!(meta.country.as_deref(), Some("DE"));
        assert_eq!(meta.city.as_deref(), Some("Berlin"));
    }

    #[tokio::test]
    async fn test_retention_prunes_old_days() {
        let tracker = tracker();
        record(&tracker, EventType::Sent, NOW - Duration::days(120), None, None).await;
        record(&tracker, EventType::Sent, NOW, None, None).await;
        assert_eq!(tracker.events_for(Uuid::nil()).await.len(), 1);
        let state = tracker.state.read().await;
        assert_eq!(state.daily.len(), 1);
    }

    #[tokio::test]
    async fn test_recorded_events_are_forwarded() {
        let (tx, mut rx) = notification_channel();
        let tracker = EventTracker::new(AnalyticsConfig::default(), Arc::new(NoGeoLookup), Some(tx));
        let event = tracker
            .record(Uuid::nil(), EventType::Sent, "a@example.com".into(), EventContext::default())
            .await;
        assert_eq!(rx.recv().await.unwrap().event, event);
    }
}
