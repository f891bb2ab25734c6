pub mod analytics;
pub mod event;
pub mod send;
pub mod tracking;
pub mod webhook;

pub use analytics::{
    AnalyticsSummary, DailyPoint, DeviceClass, EventCounts, Rates, Segment, TimeRange,
};
pub use event::{EventType, EventTypeSet, UnknownEventType};
pub use send::{
    AttachmentPayload, FieldError, JobResponse, JobStatus, QueueStats, Recipients,
    SendEmailRequest, SendEmailResponse, ValidationErrorBody,
};
pub use tracking::TrackEventRequest;
pub use webhook::{EventData, EventMetadata, WebhookEnvelope};
