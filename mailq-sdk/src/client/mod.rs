//! HTTP client for the mailq service API.
//!
//! Only compiled with the `client` feature; servers and webhook receivers
//! that need just the types and `verify_webhook` skip `reqwest`.

mod service;

pub use crate::signature::verify_webhook;
pub use service::MailClient;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never got a response (connect, TLS, timeout).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx reply. `body` is the server's JSON error, verbatim.
    #[error("mailq returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("unexpected response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// HTTP status of an API rejection, e.g. 429 when rate limited.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
