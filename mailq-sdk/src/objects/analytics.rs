//! Analytics query types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::event::EventType;

/// Aggregation window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl TimeRange {
    pub fn days(self) -> u16 {
        match self {
            TimeRange::Week => 7,
            TimeRange::Month => 30,
            TimeRange::Quarter => 90,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
            TimeRange::Quarter => "90d",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown time range: {0} (expected 7d, 30d or 90d)")]
pub struct UnknownTimeRange(pub String);

impl FromStr for TimeRange {
    type Err = UnknownTimeRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(TimeRange::Week),
            "30d" => Ok(TimeRange::Month),
            "90d" => Ok(TimeRange::Quarter),
            other => Err(UnknownTimeRange(other.to_owned())),
        }
    }
}

/// Device class derived from a user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceClass {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
        }
    }
}

/// Event counts, one field per [`EventType`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub sent: u64,
    pub delivered: u64,
    pub opened: u64,
    pub clicked: u64,
    pub bounced: u64,
    pub complained: u64,
    pub unsubscribed: u64,
}

impl EventCounts {
    pub fn get(&self, event: EventType) -> u64 {
        match event {
            EventType::Sent => self.sent,
            EventType::Delivered => self.delivered,
            EventType::Opened => self.opened,
            EventType::Clicked => self.clicked,
            EventType::Bounced => self.bounced,
            EventType::Complained => self.complained,
            EventType::Unsubscribed => self.unsubscribed,
        }
    }

    pub fn bump(&mut self, event: EventType) {
        let slot = match event {
            EventType::Sent => &mut self.sent,
            EventType::Delivered => &mut self.delivered,
            EventType::Opened => &mut self.opened,
            EventType::Clicked => &mut self.clicked,
            EventType::Bounced => &mut self.bounced,
            EventType::Complained => &mut self.complained,
            EventType::Unsubscribed => &mut self.unsubscribed,
        };
        *slot += 1;
    }

    pub fn add(&mut self, other: &EventCounts) {
        self.sent += other.sent;
        self.delivered += other.delivered;
        self.opened += other.opened;
        self.clicked += other.clicked;
        self.bounced += other.bounced;
        self.complained += other.complained;
        self.unsubscribed += other.unsubscribed;
    }

    pub fn total(&self) -> u64 {
        EventType::ALL.into_iter().map(|e| self.get(e)).sum()
    }
}

/// Derived percentages (0–100, two decimals).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rates {
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub bounce_rate: f64,
}

/// One day of the time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: time::Date,
    #[serde(flatten)]
    pub counts: EventCounts,
}

/// One entry of a geographic or device breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub label: String,
    pub count: u64,
    pub percentage: f64,
}

/// Response body for `GET /api/v1/analytics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub range: TimeRange,
    pub counts: EventCounts,
    pub rates: Rates,
    pub time_series: Vec<DailyPoint>,
    pub geography: Vec<Segment>,
    pub devices: Vec<Segment>,
}
