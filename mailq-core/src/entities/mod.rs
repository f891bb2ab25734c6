pub mod event;
pub mod job;
pub mod principal;
pub mod submission;
pub mod webhook;

pub use event::{AnalyticsEvent, EventContext};
pub use job::{Attachment, EmailBody, Job, JobSpec};
pub use principal::{Permission, PermissionSet, Principal, StoredPrincipal};
pub use submission::ValidationError;
pub use webhook::Webhook;

pub use mailq_sdk::objects::{EventType, EventTypeSet, JobStatus};
