//! Application state and background processor wiring.

use mailq_core::admission::AdmissionGate;
use mailq_core::config::{AdmissionPolicy, ConfigStore, SchedulerConfig};
use mailq_core::events::{job_sent_channel, notification_channel};
use mailq_core::framework::DatabaseProcessor;
use mailq_core::processors::{Dispatcher, Scheduler, SimulatedEngagement, WebhookNotifier};
use mailq_core::queue::JobQueue;
use mailq_core::service::MailService;
use mailq_core::store::{HistorySink, MemoryStore, PgStore, PrincipalStore, WebhookRegistry};
use mailq_core::tracker::{EventTracker, NoGeoLookup};
use mailq_core::transport::{MailTransport, SmtpSetupError, SmtpTransport};
use sqlx::PgPool;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::LoadedConfig;

const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// State shared by all request handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AdmissionGate>,
    pub service: Arc<MailService>,
    /// Peers allowed to set `X-Forwarded-For`.
    pub trusted_proxies: Arc<[IpAddr]>,
}

/// Collaborator adapters the runtime is built on.
pub struct Backends {
    pub principals: Arc<dyn PrincipalStore>,
    pub webhooks: Arc<dyn WebhookRegistry>,
    pub history: Arc<dyn HistorySink>,
    /// Set when principals and webhooks come from the config file.
    pub memory: Option<Arc<MemoryStore>>,
}

impl Backends {
    pub async fn memory(config: &LoadedConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.replace_principals(config.principals.clone()).await;
        store.replace_webhooks(config.webhooks.clone()).await;
        Self {
            principals: store.clone(),
            webhooks: store.clone(),
            history: store.clone(),
            memory: Some(store),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(DatabaseProcessor::new(pool)));
        Self {
            principals: store.clone(),
            webhooks: store.clone(),
            history: store,
            memory: None,
        }
    }
}

/// Sections that a SIGHUP reload swaps in place.
#[derive(Clone)]
pub struct Reloadable {
    pub admission: ConfigStore<AdmissionPolicy>,
    pub scheduler: ConfigStore<SchedulerConfig>,
    pub memory: Option<Arc<MemoryStore>>,
}

impl Reloadable {
    pub async fn apply(&self, config: LoadedConfig) {
        self.admission.update(config.admission).await;
        self.scheduler.update(config.scheduler).await;
        if let Some(memory) = &self.memory {
            let principals = config.principals.len();
            let webhooks = config.webhooks.len();
            memory.replace_principals(config.principals).await;
            memory.replace_webhooks(config.webhooks).await;
            tracing::info!(principals, webhooks, "Principals and webhooks reloaded");
        }
    }
}

/// Everything started for one server process.
pub struct Runtime {
    pub state: AppState,
    pub reloadable: Reloadable,
    pub tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Build the pipeline and spawn its processors. They all stop when
    /// `shutdown_rx` flips to `true`.
    pub async fn start(
        config: &LoadedConfig,
        backends: Backends,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self, SmtpSetupError> {
        let mut tasks = Vec::new();

        let (notification_tx, notification_rx) = notification_channel();
        let tracker = Arc::new(EventTracker::new(
            config.analytics,
            Arc::new(NoGeoLookup),
            Some(notification_tx),
        ));
        let notifier = WebhookNotifier::new(backends.webhooks);
        tasks.push(tokio::spawn(notifier.run(notification_rx, shutdown_rx.clone())));

        let transport: Option<Arc<dyn MailTransport>> = match &config.smtp {
            Some(smtp) => {
                let transport = Arc::new(SmtpTransport::new(smtp)?);
                let checker = transport.clone();
                let host = smtp.host.clone();
                tokio::spawn(async move {
                    match checker.test_connection().await {
                        Ok(true) => tracing::info!(%host, "SMTP relay reachable"),
                        Ok(false) => tracing::warn!(%host, "SMTP relay did not accept the connection"),
                        Err(e) => tracing::warn!(%host, error = %e, "SMTP relay not reachable"),
                    }
                });
                Some(transport as Arc<dyn MailTransport>)
            }
            None => {
                tracing::warn!("No [smtp] section configured, every job will fail");
                None
            }
        };

        let queue = Arc::new(JobQueue::new());
        let mut dispatcher = Dispatcher::new(
            queue.clone(),
            transport,
            tracker.clone(),
            backends.history.clone(),
            config.retry,
        );
        if let Some(simulation) = config.simulation {
            let (job_sent_tx, job_sent_rx) = job_sent_channel();
            dispatcher = dispatcher.with_job_sent(job_sent_tx);
            let source = SimulatedEngagement::new(tracker.clone(), simulation);
            tasks.push(tokio::spawn(source.run(job_sent_rx, shutdown_rx.clone())));
        }

        let scheduler_config = ConfigStore::new(config.scheduler.clone());
        let scheduler = Scheduler::new(queue.clone(), Arc::new(dispatcher), scheduler_config.clone());
        tasks.push(tokio::spawn(scheduler.run(shutdown_rx.clone())));

        let admission = ConfigStore::new(config.admission.clone());
        let gate = Arc::new(AdmissionGate::new(backends.principals, admission.clone()));
        tasks.push(tokio::spawn(sweep_limiter(gate.clone(), shutdown_rx)));

        let service = Arc::new(MailService::new(queue, tracker, backends.history));

        Ok(Self {
            state: AppState {
                gate,
                service,
                trusted_proxies: config.trusted_proxies.clone().into(),
            },
            reloadable: Reloadable {
                admission,
                scheduler: scheduler_config,
                memory: backends.memory,
            },
            tasks,
        })
    }
}

async fn sweep_limiter(gate: Arc<AdmissionGate>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = tokio::time::sleep(LIMITER_SWEEP_INTERVAL) => {
                let dropped = gate.sweep().await;
                if dropped > 0 {
                    tracing::debug!(dropped, "Swept idle rate limit windows");
                }
            }
        }
    }
}
