//! API key format and hashing.
//!
//! Keys look like `mq_{prefix}_{secret}`. The prefix is stored in clear and
//! used for lookup; only the SHA-256 of the whole key is persisted.

use rand::Rng;
use rand::distr::Alphanumeric;
use ring::digest;
use std::fmt;
use subtle::ConstantTimeEq;

const KEY_SCHEME: &str = "mq_";
const PREFIX_LEN: usize = 8;
const SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("api key does not have the form mq_<prefix>_<secret>")]
    MalformedKey,
    #[error("stored key hash is not a hex sha256 digest")]
    MalformedHash,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    raw: String,
    prefix_len: usize,
}

impl ApiKey {
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let rest = raw
            .strip_prefix(KEY_SCHEME)
            .ok_or(CredentialError::MalformedKey)?;
        let (prefix, secret) = rest.split_once('_').ok_or(CredentialError::MalformedKey)?;
        let well_formed = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());
        if !well_formed(prefix) || !well_formed(secret) {
            return Err(CredentialError::MalformedKey);
        }
        Ok(Self {
            raw: raw.to_owned(),
            prefix_len: prefix.len(),
        })
    }

    /// A fresh random key.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut token = |len: usize| -> String {
            (&mut rng)
                .sample_iter(Alphanumeric)
                .take(len)
                .map(char::from)
                .collect()
        };
        let prefix = token(PREFIX_LEN);
        let secret = token(SECRET_LEN);
        Self {
            raw: format!("{KEY_SCHEME}{prefix}_{secret}"),
            prefix_len: PREFIX_LEN,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.raw[KEY_SCHEME.len()..KEY_SCHEME.len() + self.prefix_len]
    }

    pub fn expose(&self) -> &str {
        &self.raw
    }

    pub fn hash(&self) -> KeyHash {
        let digest = digest::digest(&digest::SHA256, self.raw.as_bytes());
        KeyHash(hex::encode(digest.as_ref()))
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({KEY_SCHEME}{}_***)", self.prefix())
    }
}

/// Lowercase hex SHA-256 of a full API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHash(String);

impl KeyHash {
    pub fn from_hex(hex_digest: &str) -> Result<Self, CredentialError> {
        let normalized = hex_digest.to_ascii_lowercase();
        match hex::decode(&normalized) {
            Ok(bytes) if bytes.len() == digest::SHA256.output_len() => Ok(Self(normalized)),
            _ => Err(CredentialError::MalformedHash),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against the hash of `key`.
    pub fn matches(&self, key: &ApiKey) -> bool {
        key.hash().0.as_bytes().ct_eq(self.0.as_bytes()).into()
    }
}
