//! PostgreSQL-backed store.
//!
//! Each query is a small struct processed by [`DatabaseProcessor`]; the
//! collaborator traits are implemented on [`PgStore`] on top of them.

use kanau::processor::Processor;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{HistorySink, PrincipalStore, StoreError, WebhookRegistry};
use crate::admission::{ApiKey, KeyHash};
use crate::entities::job::JobStatusRecord;
use crate::entities::{EventTypeSet, Job, PermissionSet, Principal, Webhook};
use crate::framework::DatabaseProcessor;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PrincipalRow {
    pub id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub permissions: String,
    pub rate_limit: i32,
    pub active: bool,
    pub last_used_at: Option<OffsetDateTime>,
}

impl PrincipalRow {
    fn into_principal(self) -> Result<(Principal, KeyHash), StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.to_string(),
            reason,
        };
        let key_hash = KeyHash::from_hex(&self.key_hash).map_err(|e| corrupt(e.to_string()))?;
        let permissions =
            PermissionSet::parse_joined(&self.permissions).map_err(|e| corrupt(e.to_string()))?;
        let principal = Principal {
            id: self.id,
            name: self.name,
            permissions,
            rate_limit: u32::try_from(self.rate_limit).unwrap_or(0),
            active: self.active,
            last_used_at: self.last_used_at,
        };
        Ok((principal, key_hash))
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebhookRow {
    pub id: Uuid,
    pub url: String,
    pub secret: String,
    pub events: String,
    pub active: bool,
    pub failure_count: i32,
}

impl TryFrom<WebhookRow> for Webhook {
    type Error = StoreError;

    fn try_from(row: WebhookRow) -> Result<Self, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: row.id.to_string(),
            reason,
        };
        Ok(Webhook {
            id: row.id,
            url: row.url.parse().map_err(|e: url::ParseError| corrupt(e.to_string()))?,
            secret: row.secret.clone(),
            events: EventTypeSet::parse_joined(&row.events).map_err(|e| corrupt(e.to_string()))?,
            active: row.active,
            failure_count: u32::try_from(row.failure_count).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone)]
/// Look up an API key by its clear-text prefix.
pub struct GetPrincipalByPrefix {
    pub prefix: String,
}

impl Processor<GetPrincipalByPrefix> for DatabaseProcessor {
    type Output = Option<PrincipalRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPrincipalByPrefix")]
    async fn process(&self, query: GetPrincipalByPrefix) -> Result<Option<PrincipalRow>, sqlx::Error> {
        sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT id, name, key_hash, permissions, rate_limit, active, last_used_at
            FROM api_keys
            WHERE key_prefix = $1
            "#,
        )
        .bind(query.prefix)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct TouchPrincipal {
    pub id: Uuid,
    pub at: OffsetDateTime,
}

impl Processor<TouchPrincipal> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:TouchPrincipal")]
    async fn process(&self, query: TouchPrincipal) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(query.id)
            .bind(query.at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ListActiveWebhooks;

impl Processor<ListActiveWebhooks> for DatabaseProcessor {
    type Output = Vec<WebhookRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListActiveWebhooks")]
    async fn process(&self, _: ListActiveWebhooks) -> Result<Vec<WebhookRow>, sqlx::Error> {
        sqlx::query_as::<_, WebhookRow>(
            r#"
            SELECT id, url, secret, events, active, failure_count
            FROM webhooks
            WHERE active = true
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Bump the consecutive failure counter and return the new value.
pub struct IncrementWebhookFailure {
    pub id: Uuid,
}

impl Processor<IncrementWebhookFailure> for DatabaseProcessor {
    type Output = Option<i32>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:IncrementWebhookFailure")]
    async fn process(&self, query: IncrementWebhookFailure) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE webhooks
            SET failure_count = failure_count + 1
            WHERE id = $1
            RETURNING failure_count
            "#,
        )
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct ResetWebhookFailure {
    pub id: Uuid,
}

impl Processor<ResetWebhookFailure> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ResetWebhookFailure")]
    async fn process(&self, query: ResetWebhookFailure) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE webhooks SET failure_count = 0 WHERE id = $1 AND failure_count <> 0")
            .bind(query.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InsertJobRecord {
    pub id: Uuid,
    pub recipients: serde_json::Value,
    pub subject: String,
    pub status: JobStatusRecord,
    pub attempts: i32,
    pub scheduled_for: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl Processor<InsertJobRecord> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertJobRecord")]
    async fn process(&self, insert: InsertJobRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO email_jobs (id, recipients, subject, status, attempts, scheduled_for, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(insert.id)
        .bind(Json(insert.recipients))
        .bind(insert.subject)
        .bind(insert.status)
        .bind(insert.attempts)
        .bind(insert.scheduled_for)
        .bind(insert.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateJobRecord {
    pub id: Uuid,
    pub status: JobStatusRecord,
    pub attempts: i32,
    pub sent_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

impl Processor<UpdateJobRecord> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateJobRecord")]
    async fn process(&self, update: UpdateJobRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE email_jobs
            SET status = $2, attempts = $3, sent_at = $4, last_error = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(update.id)
        .bind(update.status)
        .bind(update.attempts)
        .bind(update.sent_at)
        .bind(update.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Collaborator traits backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    db: DatabaseProcessor,
}

impl PgStore {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

fn attempts_column(job: &Job) -> i32 {
    i32::try_from(job.attempts).unwrap_or(i32::MAX)
}

#[async_trait::async_trait]
impl PrincipalStore for PgStore {
    async fn validate(&self, key: &ApiKey) -> Result<Option<Principal>, StoreError> {
        let row = self
            .db
            .process(GetPrincipalByPrefix {
                prefix: key.prefix().to_owned(),
            })
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let (principal, key_hash) = row.into_principal()?;
        Ok(key_hash.matches(key).then_some(principal))
    }

    async fn touch_last_used(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError> {
        self.db.process(TouchPrincipal { id, at }).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WebhookRegistry for PgStore {
    async fn list_active(&self) -> Result<Vec<Webhook>, StoreError> {
        let rows = self.db.process(ListActiveWebhooks).await?;
        let mut webhooks = Vec::with_capacity(rows.len());
        for row in rows {
            match Webhook::try_from(row) {
                Ok(webhook) => webhooks.push(webhook),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable webhook row"),
            }
        }
        Ok(webhooks)
    }

    async fn increment_failure(&self, id: Uuid) -> Result<u32, StoreError> {
        let count = self.db.process(IncrementWebhookFailure { id }).await?;
        Ok(count.and_then(|c| u32::try_from(c).ok()).unwrap_or(0))
    }

    async fn reset_failure(&self, id: Uuid) -> Result<(), StoreError> {
        self.db.process(ResetWebhookFailure { id }).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl HistorySink for PgStore {
    async fn record_history(&self, job: &Job) -> Result<(), StoreError> {
        let recipients = serde_json::json!({
            "to": job.to,
            "cc": job.cc,
            "bcc": job.bcc,
        });
        self.db
            .process(InsertJobRecord {
                id: job.id,
                recipients,
                subject: job.subject.clone(),
                status: job.status.into(),
                attempts: attempts_column(job),
                scheduled_for: job.scheduled_for,
                created_at: job.created_at,
            })
            .await?;
        Ok(())
    }

    async fn update_status(&self, job: &Job) -> Result<(), StoreError> {
        self.db
            .process(UpdateJobRecord {
                id: job.id,
                status: job.status.into(),
                attempts: attempts_column(job),
                sent_at: job.sent_at,
                last_error: job.last_error.clone(),
            })
            .await?;
        Ok(())
    }
}
