//! TOML file configuration structures.
//!
//! These structs map directly to the `mailq.toml` file format. Every
//! section is optional; omitted values fall back to the defaults below.

use mailq_core::config::SmtpTls;
use mailq_core::entities::{EventType, Permission};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use url::Url;
use uuid::Uuid;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub admission: AdmissionSection,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpSection>,
    #[serde(default)]
    pub analytics: AnalyticsSection,
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub principals: Vec<PrincipalEntry>,
    #[serde(default)]
    pub webhooks: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    /// Peers whose `X-Forwarded-For` header is believed. Requests from
    /// anyone else are attributed to the socket address.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            trusted_proxies: Vec::new(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionSection {
    pub public_access: bool,
    pub window_secs: u64,
    pub public_rate_limit: u32,
}

impl Default for AdmissionSection {
    fn default() -> Self {
        Self {
            public_access: false,
            window_secs: 60,
            public_rate_limit: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub concurrency: usize,
    pub batch_pause_ms: u64,
    pub idle_poll_ms: u64,
    pub max_attempts: u32,
    pub base_delay_secs: u64,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            concurrency: 5,
            batch_pause_ms: 100,
            idle_poll_ms: 1000,
            max_attempts: 3,
            base_delay_secs: 5,
        }
    }
}

/// SMTP relay. Without this section every job fails with
/// "no mail transport configured".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSection {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: SmtpTls,
    pub from: String,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

fn default_smtp_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsSection {
    pub retention_days: u16,
    pub top_n: usize,
}

impl Default for AnalyticsSection {
    fn default() -> Self {
        Self {
            retention_days: 90,
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    pub enabled: bool,
    pub delivered: f64,
    pub opened: f64,
    pub clicked: f64,
    pub max_delay_secs: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            enabled: false,
            delivered: 0.95,
            opened: 0.4,
            clicked: 0.25,
            max_delay_secs: 30,
        }
    }
}

/// An API key holder.
///
/// Write `key = "mq_..."` to add one; on load the key is replaced by
/// `key_prefix` + `key_hash` and the file is rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_hash: Option<String>,
    #[serde(default = "default_permissions")]
    pub permissions: Vec<Permission>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_permissions() -> Vec<Permission> {
    vec![Permission::Send, Permission::Read]
}

fn default_rate_limit() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub url: Url,
    pub secret: String,
    /// Subscribed event types. Empty means all of them.
    #[serde(default)]
    pub events: Vec<EventType>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"
trusted_proxies = ["10.0.0.1", "::1"]

[admission]
public_access = true
public_rate_limit = 10

[queue]
concurrency = 8

[smtp]
host = "smtp.example.com"
port = 587
username = "mailer"
password = "hunter2"
from = "Mailer <noreply@example.com>"

[simulation]
enabled = true

[[principals]]
name = "backend"
key = "mq_backend_s3cr3t"
permissions = ["send", "read", "analytics"]

[[webhooks]]
url = "https://hooks.example.com/mail"
secret = "whsec"
events = ["bounced", "opened"]
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(
            config.server.trusted_proxies,
            ["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]
        );
        assert!(config.admission.public_access);
        assert_eq!(config.admission.window_secs, 60);
        assert_eq!(config.queue.concurrency, 8);
        assert_eq!(config.queue.max_attempts, 3);
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.tls, SmtpTls::Starttls);
        assert_eq!(smtp.timeout_secs, 30);
        assert!(config.simulation.enabled);
        assert_eq!(config.principals[0].permissions.len(), 3);
        assert_eq!(config.principals[0].rate_limit, 60);
        assert!(config.principals[0].active);
        assert_eq!(config.webhooks[0].events, [EventType::Bounced, EventType::Opened]);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert!(config.server.trusted_proxies.is_empty());
        assert!(!config.admission.public_access);
        assert!(config.smtp.is_none());
        assert!(!config.simulation.enabled);
        assert!(config.principals.is_empty());
    }
}
