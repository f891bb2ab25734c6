//! WebhookNotifier processor.
//!
//! Receives every recorded event from the tracker and fans it out to the
//! active webhooks subscribed to its type. Each delivery is a single signed
//! POST; the outcome only moves the webhook's failure counter. Nothing here
//! can slow down or fail the job pipeline: each event's fan-out runs in its
//! own task so the channel keeps draining.

use futures_util::future::join_all;
use mailq_sdk::signature::{EVENT_HEADER, SIGNATURE_HEADER, SignedEnvelope};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::{AnalyticsEvent, Webhook};
use crate::events::NotificationReceiver;
use crate::store::{StoreError, WebhookRegistry};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("registry error: {0}")]
    Registry(#[from] StoreError),

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook delivery failed with status {status}: {body}")]
    DeliveryFailed { status: u16, body: String },
}

/// Result of one (event, webhook) delivery.
#[derive(Debug)]
pub struct DeliveryReport {
    pub webhook_id: Uuid,
    pub result: Result<(), WebhookError>,
}

#[derive(Clone)]
pub struct WebhookNotifier {
    registry: Arc<dyn WebhookRegistry>,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(registry: Arc<dyn WebhookRegistry>) -> Self {
        Self {
            registry,
            http_client: reqwest::Client::builder()
                .timeout(DELIVERY_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    pub async fn run(self, mut rx: NotificationReceiver, mut shutdown_rx: watch::Receiver<bool>) {
        info!("WebhookNotifier started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("WebhookNotifier received shutdown signal");
                        break;
                    }
                }

                Some(notification) = rx.recv() => {
                    let notifier = self.clone();
                    tokio::spawn(async move {
                        notifier.notify(&notification.event).await;
                    });
                }

                else => {
                    info!("Notification channel closed");
                    break;
                }
            }
        }

        info!("WebhookNotifier shutdown complete");
    }

    /// Deliver `event` once to every active subscriber.
    #[tracing::instrument(skip_all, fields(event = %event.event, event_id = %event.id))]
    pub async fn notify(&self, event: &AnalyticsEvent) -> Vec<DeliveryReport> {
        let webhooks = match self.registry.list_active().await {
            Ok(webhooks) => webhooks,
            Err(e) => {
                warn!(error = %e, "Failed to list webhooks");
                return Vec::new();
            }
        };
        let targets: Vec<Webhook> = webhooks
            .into_iter()
            .filter(|w| w.accepts(event.event))
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }

        let envelope = match event.to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Failed to build webhook envelope");
                return Vec::new();
            }
        };

        join_all(targets.iter().map(|webhook| {
            let envelope = envelope.clone();
            async move {
                let result = match SignedEnvelope::new(envelope, webhook.secret.as_bytes()) {
                    Ok(signed) => self.deliver(webhook, &signed).await,
                    Err(e) => Err(e.into()),
                };
                self.settle(webhook, &result).await;
                DeliveryReport {
                    webhook_id: webhook.id,
                    result,
                }
            }
        }))
        .await
    }

    async fn deliver(&self, webhook: &Webhook, signed: &SignedEnvelope) -> Result<(), WebhookError> {
        let response = self
            .http_client
            .post(webhook.url.clone())
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signed.to_header())
            .header(EVENT_HEADER, signed.envelope.event.as_str())
            .body(signed.json.clone())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(WebhookError::DeliveryFailed {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn settle(&self, webhook: &Webhook, result: &Result<(), WebhookError>) {
        match result {
            Ok(()) => {
                debug!(webhook = %webhook.id, "Webhook delivered");
                if let Err(e) = self.registry.reset_failure(webhook.id).await {
                    warn!(webhook = %webhook.id, error = %e, "Failed to reset webhook failures");
                }
            }
            Err(error) => match self.registry.increment_failure(webhook.id).await {
                Ok(failures) => warn!(
                    webhook = %webhook.id,
                    url = %webhook.url,
                    error = %error,
                    failures,
                    "Webhook delivery failed"
                ),
                Err(e) => warn!(
                    webhook = %webhook.id,
                    error = %error,
                    registry_error = %e,
                    "Webhook delivery failed and its failure count could not be updated"
                ),
            },
        }
    }
}
