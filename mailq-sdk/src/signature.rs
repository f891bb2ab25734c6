//! Webhook signature scheme and shared header names.
//!
//! Every outbound webhook body is signed with the subscriber's secret:
//!
//! ```text
//! X-Webhook-Signature: sha256={hex(HMAC-SHA256(secret, body))}
//! X-Webhook-Event:     {event}
//! ```
//!
//! `body` is the canonical JSON of the [`WebhookEnvelope`] (keys sorted, no
//! whitespace), sent byte-for-byte as the request body.

use crate::objects::WebhookEnvelope;

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Header name carrying the event type of a webhook delivery.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Header name for API key authentication (alternative to `Authorization: Bearer`).
pub const API_KEY_HEADER: &str = "X-API-Key";

pub const RATE_LIMIT_LIMIT_HEADER: &str = "X-RateLimit-Limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "X-RateLimit-Remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "X-RateLimit-Reset";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

// ---------------------------------------------------------------------------
// SignedEnvelope
// ---------------------------------------------------------------------------

/// A webhook envelope together with the exact JSON that was signed and its
/// HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    pub envelope: WebhookEnvelope,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl SignedEnvelope {
    /// Serialize `envelope` canonically and sign it with `key`.
    pub fn new(envelope: WebhookEnvelope, key: &[u8]) -> Result<Self, serde_json::Error> {
        let json = envelope.to_canonical_json()?;
        let signature = hmac_sha256(key, json.as_bytes());
        Ok(Self {
            envelope,
            json,
            signature,
        })
    }

    /// Format the `X-Webhook-Signature` header value (`sha256={hex}`).
    pub fn to_header(&self) -> String {
        format_signature_header(&self.signature)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Box<[u8]> {
    let tag = ring::hmac::sign(&ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key), data);
    tag.as_ref().to_owned().into_boxed_slice()
}

// ---------------------------------------------------------------------------
// Header parsing / formatting
// ---------------------------------------------------------------------------

/// Compute the header value for an arbitrary body.
pub fn sign(key: &[u8], body: &[u8]) -> String {
    format_signature_header(&hmac_sha256(key, body))
}

/// Format `sha256={hex}` from raw signature bytes.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", hex::encode(signature))
}

/// Parse a `sha256={hex}` header value into raw signature bytes.
pub fn parse_signature_header(value: &str) -> Result<Box<[u8]>, SignatureError> {
    let hex_part = value
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::InvalidFormat)?;
    hex::decode(hex_part)
        .map(Vec::into_boxed_slice)
        .map_err(|_| SignatureError::InvalidHex)
}

/// Verify `body` against a `sha256={hex}` header value in constant time.
pub fn verify(key: &[u8], body: &[u8], header_value: &str) -> Result<(), SignatureError> {
    let signature = parse_signature_header(header_value)?;
    ring::hmac::verify(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        body,
        &signature,
    )?;
    Ok(())
}

/// Verify and deserialize an incoming webhook delivery.
///
/// * `signature_header` – value of the `X-Webhook-Signature` request header.
/// * `body` – raw request body.
/// * `secret` – the subscription secret.
pub fn verify_webhook(
    signature_header: &str,
    body: &str,
    secret: &[u8],
) -> Result<WebhookEnvelope, SignatureError> {
    verify(secret, body.as_bytes(), signature_header)?;
    Ok(serde_json::from_str(body)?)
}
