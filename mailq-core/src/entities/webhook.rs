use mailq_sdk::objects::{EventType, EventTypeSet};
use url::Url;
use uuid::Uuid;

/// A registered webhook subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    pub id: Uuid,
    pub url: Url,
    /// HMAC key shared with the subscriber.
    pub secret: String,
    pub events: EventTypeSet,
    pub active: bool,
    /// Consecutive failed deliveries. Reset on success.
    pub failure_count: u32,
}

impl Webhook {
    pub fn accepts(&self, event: EventType) -> bool {
        self.active && self.events.contains(event)
    }
}
