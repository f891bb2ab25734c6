//! Outbound SMTP relay settings.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// Implicit TLS (SMTPS, usually port 465).
    Wrapper,
    /// STARTTLS upgrade (usually port 587).
    #[default]
    Starttls,
    /// Plain text. Only for local relays and test sinks.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: SmtpTls,
    /// `From` mailbox, e.g. `Mailer <noreply@example.com>`.
    pub from: String,
    pub timeout: Duration,
}
