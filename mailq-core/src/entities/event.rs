use mailq_sdk::objects::{EventData, EventMetadata, EventType, WebhookEnvelope};
use std::net::IpAddr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Request context a tracked event was observed with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    pub user_agent: Option<String>,
    pub ip_address: Option<IpAddr>,
}

/// One recorded occurrence of a delivery or engagement event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsEvent {
    pub id: Uuid,
    pub job_id: Uuid,
    pub event: EventType,
    pub recipient: String,
    pub timestamp: OffsetDateTime,
    pub metadata: EventMetadata,
}

impl AnalyticsEvent {
    /// Webhook envelope for this event. The envelope id is the event id, so
    /// every subscriber sees the same identifier for one occurrence.
    pub fn to_envelope(&self) -> Result<WebhookEnvelope, serde_json::Error> {
        let data = EventData {
            job_id: self.job_id,
            recipient: self.recipient.clone(),
            metadata: self.metadata.clone(),
        };
        Ok(WebhookEnvelope {
            event: self.event,
            data: serde_json::to_value(data)?,
            timestamp: self.timestamp,
            id: self.id,
        })
    }
}
