//! Webhook delivery envelope and event payloads.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use time::OffsetDateTime;
use uuid::Uuid;

use super::analytics::DeviceClass;
use super::event::EventType;

/// Context attached to an analytics event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// The `data` member of a webhook envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub job_id: Uuid,
    pub recipient: String,
    #[serde(default)]
    pub metadata: EventMetadata,
}

/// Body of every outbound webhook POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event: EventType,
    pub data: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Identifier of the event occurrence; stable across subscribers.
    pub id: Uuid,
}

impl WebhookEnvelope {
    /// Serialize with object keys sorted at every level and no whitespace.
    ///
    /// Goes through `serde_json::Value`, whose map is ordered by key as long
    /// as serde_json's `preserve_order` feature stays disabled.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        Ok(serde_json::to_value(self)?.to_string())
    }
}
