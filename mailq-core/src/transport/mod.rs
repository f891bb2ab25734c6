//! Mail transports.
//!
//! The dispatcher only sees [`MailTransport`]; classification of failures
//! into transient and permanent happens here, close to the wire.

mod capture;
mod smtp;

pub use capture::CaptureTransport;
pub use smtp::{SmtpSetupError, SmtpTransport};

use crate::entities::Job;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Worth retrying: connection problems, timeouts, 4xx replies.
    #[error("transient transport error: {0}")]
    Transient(String),
    /// Retrying cannot help: 5xx replies, messages that cannot be built.
    #[error("permanent transport error: {0}")]
    Permanent(String),
    #[error("no mail transport configured")]
    Unavailable,
}

#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, job: &Job) -> Result<(), TransportError>;
}
