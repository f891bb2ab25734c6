//! Collaborator interfaces for persistent state.
//!
//! The queue and the analytics log live in memory. Principals, webhook
//! subscriptions and the durable job history sit behind these traits, with
//! an in-memory implementation fed from the config file and a PostgreSQL one
//! used when a database is configured.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::admission::ApiKey;
use crate::entities::{Job, Principal, Webhook};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

#[async_trait::async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Principal owning `key`, when the stored hash matches. Inactive
    /// principals are returned as well; the caller decides what to do.
    async fn validate(&self, key: &ApiKey) -> Result<Option<Principal>, StoreError>;

    async fn touch_last_used(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait WebhookRegistry: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Webhook>, StoreError>;

    /// Increment the consecutive failure counter. Returns the new value.
    async fn increment_failure(&self, id: Uuid) -> Result<u32, StoreError>;

    async fn reset_failure(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Durable mirror of job state. Writes are best effort; the in-memory queue
/// stays authoritative.
#[async_trait::async_trait]
pub trait HistorySink: Send + Sync {
    async fn record_history(&self, job: &Job) -> Result<(), StoreError>;

    /// Persist status, attempts, `sent_at` and `last_error` of `job`.
    async fn update_status(&self, job: &Job) -> Result<(), StoreError>;
}
