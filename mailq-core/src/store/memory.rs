//! In-memory store, populated from the config file.

use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{HistorySink, PrincipalStore, StoreError, WebhookRegistry};
use crate::admission::ApiKey;
use crate::entities::{Job, Principal, StoredPrincipal, Webhook};

#[derive(Default)]
pub struct MemoryStore {
    /// Keyed by API key prefix.
    principals: RwLock<HashMap<String, StoredPrincipal>>,
    webhooks: RwLock<Vec<Webhook>>,
    history: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new principal set. `last_used_at` survives for principals
    /// that keep their id.
    pub async fn replace_principals(&self, principals: Vec<StoredPrincipal>) {
        let mut guard = self.principals.write().await;
        let previous: HashMap<Uuid, Option<OffsetDateTime>> = guard
            .values()
            .map(|p| (p.principal.id, p.principal.last_used_at))
            .collect();
        *guard = principals
            .into_iter()
            .map(|mut p| {
                if let Some(last_used) = previous.get(&p.principal.id) {
                    p.principal.last_used_at = *last_used;
                }
                (p.key_prefix.clone(), p)
            })
            .collect();
    }

    /// Swap in a new webhook set. Failure counters survive for webhooks
    /// that keep their id.
    pub async fn replace_webhooks(&self, webhooks: Vec<Webhook>) {
        let mut guard = self.webhooks.write().await;
        let previous: HashMap<Uuid, u32> = guard.iter().map(|w| (w.id, w.failure_count)).collect();
        *guard = webhooks
            .into_iter()
            .map(|mut w| {
                if let Some(count) = previous.get(&w.id) {
                    w.failure_count = *count;
                }
                w
            })
            .collect();
    }

    pub async fn principal(&self, id: Uuid) -> Option<Principal> {
        self.principals
            .read()
            .await
            .values()
            .find(|p| p.principal.id == id)
            .map(|p| p.principal.clone())
    }

    pub async fn webhook(&self, id: Uuid) -> Option<Webhook> {
        self.webhooks.read().await.iter().find(|w| w.id == id).cloned()
    }

    pub async fn history(&self, id: Uuid) -> Option<Job> {
        self.history.read().await.get(&id).cloned()
    }
}

#[async_trait::async_trait]
impl PrincipalStore for MemoryStore {
    async fn validate(&self, key: &ApiKey) -> Result<Option<Principal>, StoreError> {
        let guard = self.principals.read().await;
        Ok(guard
            .get(key.prefix())
            .filter(|stored| stored.key_hash.matches(key))
            .map(|stored| stored.principal.clone()))
    }

    async fn touch_last_used(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError> {
        let mut guard = self.principals.write().await;
        if let Some(stored) = guard.values_mut().find(|p| p.principal.id == id) {
            stored.principal.last_used_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl WebhookRegistry for MemoryStore {
    async fn list_active(&self) -> Result<Vec<Webhook>, StoreError> {
        let guard = self.webhooks.read().await;
        Ok(guard.iter().filter(|w| w.active).cloned().collect())
    }

    async fn increment_failure(&self, id: Uuid) -> Result<u32, StoreError> {
        let mut guard = self.webhooks.write().await;
        Ok(guard
            .iter_mut()
            .find(|w| w.id == id)
            .map(|w| {
                w.failure_count = w.failure_count.saturating_add(1);
                w.failure_count
            })
            .unwrap_or_default())
    }

    async fn reset_failure(&self, id: Uuid) -> Result<(), StoreError> {
        let mut guard = self.webhooks.write().await;
        if let Some(w) = guard.iter_mut().find(|w| w.id == id) {
            w.failure_count = 0;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl HistorySink for MemoryStore {
    async fn record_history(&self, job: &Job) -> Result<(), StoreError> {
        self.history
            .write()
            .await
            .entry(job.id)
            .or_insert_with(|| job.clone());
        Ok(())
    }

    async fn update_status(&self, job: &Job) -> Result<(), StoreError> {
        let mut guard = self.history.write().await;
        if let Some(entry) = guard.get_mut(&job.id) {
            entry.status = job.status;
            entry.attempts = job.attempts;
            entry.sent_at = job.sent_at;
            entry.last_error = job.last_error.clone();
        }
        Ok(())
    }
}
