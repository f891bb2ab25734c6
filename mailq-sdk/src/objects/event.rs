//! Event kinds and subscription sets.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A delivery lifecycle or engagement event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Complained,
    Unsubscribed,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 7] = [
        EventType::Sent,
        EventType::Delivered,
        EventType::Opened,
        EventType::Clicked,
        EventType::Bounced,
        EventType::Complained,
        EventType::Unsubscribed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Sent => "sent",
            EventType::Delivered => "delivered",
            EventType::Opened => "opened",
            EventType::Clicked => "clicked",
            EventType::Bounced => "bounced",
            EventType::Complained => "complained",
            EventType::Unsubscribed => "unsubscribed",
        }
    }

    /// Events produced by the dispatcher itself. External tracking
    /// callbacks may not report these.
    pub fn is_lifecycle(self) -> bool {
        matches!(self, EventType::Sent | EventType::Bounced)
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_owned()))
    }
}

/// A closed set of [`EventType`]s, stored as a bitmask.
///
/// Serializes as a list of event names. Storage layers that keep the set as
/// a comma-joined string go through [`EventTypeSet::parse_joined`] and
/// [`EventTypeSet::to_joined`] once, at the boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventTypeSet(u8);

impl EventTypeSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        EventType::ALL.into_iter().collect()
    }

    pub fn insert(&mut self, event: EventType) {
        self.0 |= event.bit();
    }

    pub fn contains(&self, event: EventType) -> bool {
        self.0 & event.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = EventType> + '_ {
        EventType::ALL.into_iter().filter(|e| self.contains(*e))
    }

    /// Parse `"sent,bounced"`. Whitespace around names and empty segments
    /// are ignored.
    pub fn parse_joined(joined: &str) -> Result<Self, UnknownEventType> {
        joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(EventType::from_str)
            .collect()
    }

    pub fn to_joined(&self) -> String {
        self.iter().map(EventType::as_str).collect::<Vec<_>>().join(",")
    }
}

impl FromIterator<EventType> for EventTypeSet {
    fn from_iter<I: IntoIterator<Item = EventType>>(iter: I) -> Self {
        let mut set = Self::empty();
        for event in iter {
            set.insert(event);
        }
        set
    }
}

impl Serialize for EventTypeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for EventTypeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let events = Vec::<EventType>::deserialize(deserializer)?;
        Ok(events.into_iter().collect())
    }
}
