//! Configuration module for mailq-server.
//!
//! Loads the TOML file, applies CLI overrides, hashes plaintext API keys
//! (rewriting the file) and converts the sections into the runtime types
//! used by `mailq-core`.

pub mod file;

use crate::config::file::{FileConfig, PrincipalEntry, WebhookEntry};
use mailq_core::admission::{ApiKey, KeyHash};
use mailq_core::config::{
    AdmissionPolicy, AnalyticsConfig, RetryPolicy, SchedulerConfig, SimulationConfig, SmtpConfig,
};
use mailq_core::entities::{EventTypeSet, Principal, StoredPrincipal, Webhook};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub trusted_proxies: Vec<IpAddr>,
    pub admission: AdmissionPolicy,
    pub scheduler: SchedulerConfig,
    pub retry: RetryPolicy,
    pub smtp: Option<SmtpConfig>,
    pub analytics: AnalyticsConfig,
    pub simulation: Option<SimulationConfig>,
    pub principals: Vec<StoredPrincipal>,
    pub webhooks: Vec<Webhook>,
}

pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// Plaintext `key` entries are replaced by their prefix and hash, and
    /// entries without an `id` get one. Either change rewrites the file so
    /// ids stay stable across restarts and reloads.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if normalize(&mut file_config)? {
            self.rewrite_config(&file_config)?;
            tracing::info!("API keys hashed and config file updated");
        }

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        build_loaded_config(file_config)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

/// Hash plaintext keys and assign missing ids. Returns whether anything
/// changed.
fn normalize(config: &mut FileConfig) -> Result<bool, ConfigError> {
    let mut changed = false;
    for entry in &mut config.principals {
        if let Some(raw) = entry.key.take() {
            let key = ApiKey::parse(&raw).map_err(|e| {
                ConfigError::ValidationError(format!("principal {}: {e}", entry.name))
            })?;
            entry.key_prefix = Some(key.prefix().to_owned());
            entry.key_hash = Some(key.hash().as_str().to_owned());
            changed = true;
        }
        if entry.id.is_none() {
            entry.id = Some(Uuid::now_v7());
            changed = true;
        }
    }
    for entry in &mut config.webhooks {
        if entry.id.is_none() {
            entry.id = Some(Uuid::now_v7());
            changed = true;
        }
    }
    Ok(changed)
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    let FileConfig {
        server,
        admission,
        queue,
        smtp,
        analytics,
        simulation,
        principals,
        webhooks,
    } = file_config;

    if admission.window_secs == 0 {
        return Err(ConfigError::ValidationError(
            "admission.window_secs must be positive".into(),
        ));
    }
    if queue.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "queue.max_attempts must be at least 1".into(),
        ));
    }
    if analytics.retention_days < 90 {
        return Err(ConfigError::ValidationError(
            "analytics.retention_days must cover the 90 day range".into(),
        ));
    }
    for (name, p) in [
        ("delivered", simulation.delivered),
        ("opened", simulation.opened),
        ("clicked", simulation.clicked),
    ] {
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::ValidationError(format!(
                "simulation.{name} must be between 0 and 1"
            )));
        }
    }

    Ok(LoadedConfig {
        listen: server.listen,
        trusted_proxies: server.trusted_proxies,
        admission: AdmissionPolicy {
            public_access: admission.public_access,
            window: Duration::from_secs(admission.window_secs),
            public_rate_limit: admission.public_rate_limit,
        },
        scheduler: SchedulerConfig {
            concurrency: queue.concurrency.max(1),
            batch_pause: Duration::from_millis(queue.batch_pause_ms),
            idle_poll: Duration::from_millis(queue.idle_poll_ms.max(1)),
        },
        retry: RetryPolicy {
            max_attempts: queue.max_attempts,
            base_delay: Duration::from_secs(queue.base_delay_secs),
        },
        smtp: smtp.map(|s| SmtpConfig {
            host: s.host,
            port: s.port,
            username: s.username,
            password: s.password,
            tls: s.tls,
            from: s.from,
            timeout: Duration::from_secs(s.timeout_secs),
        }),
        analytics: AnalyticsConfig {
            retention_days: analytics.retention_days,
            top_n: analytics.top_n,
        },
        simulation: simulation.enabled.then(|| SimulationConfig {
            delivered: simulation.delivered,
            opened: simulation.opened,
            clicked: simulation.clicked,
            max_delay: Duration::from_secs(simulation.max_delay_secs),
        }),
        principals: principals
            .into_iter()
            .map(convert_principal)
            .collect::<Result<_, _>>()?,
        webhooks: webhooks.into_iter().map(convert_webhook).collect(),
    })
}

fn convert_principal(entry: PrincipalEntry) -> Result<StoredPrincipal, ConfigError> {
    let invalid = |what: &str| ConfigError::ValidationError(format!("principal {}: {what}", entry.name));
    let key_prefix = entry.key_prefix.clone().ok_or_else(|| invalid("missing key_prefix"))?;
    let key_hash = entry
        .key_hash
        .as_deref()
        .ok_or_else(|| invalid("missing key_hash"))
        .and_then(|h| KeyHash::from_hex(h).map_err(|e| invalid(&e.to_string())))?;
    Ok(StoredPrincipal {
        principal: Principal {
            id: entry.id.unwrap_or_else(Uuid::now_v7),
            permissions: entry.permissions.iter().copied().collect(),
            name: entry.name,
            rate_limit: entry.rate_limit,
            active: entry.active,
            last_used_at: None,
        },
        key_prefix,
        key_hash,
    })
}

fn convert_webhook(entry: WebhookEntry) -> Webhook {
    let events = if entry.events.is_empty() {
        EventTypeSet::all()
    } else {
        entry.events.iter().copied().collect()
    };
    Webhook {
        id: entry.id.unwrap_or_else(Uuid::now_v7),
        url: entry.url,
        secret: entry.secret,
        events,
        active: entry.active,
        failure_count: 0,
    }
}

/// Database URL from the environment. When unset the in-memory store is
/// used.
pub fn get_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())
}
