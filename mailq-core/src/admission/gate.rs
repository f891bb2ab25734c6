use std::net::IpAddr;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use super::credential::ApiKey;
use super::rate_limit::{RateDecision, SlidingWindowLimiter};
use crate::config::{AdmissionPolicy, ConfigStore};
use crate::entities::{Permission, PermissionSet, Principal};
use crate::store::{PrincipalStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("authentication required")]
    AuthRequired,
    #[error("invalid api key")]
    InvalidCredential,
    #[error("missing permission: {0}")]
    Forbidden(Permission),
    #[error("rate limit exceeded")]
    RateLimitExceeded(RateDecision),
    #[error("principal store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Principal(Principal),
    Anonymous { ip: Option<IpAddr> },
}

impl Caller {
    pub fn principal_id(&self) -> Option<Uuid> {
        match self {
            Caller::Principal(p) => Some(p.id),
            Caller::Anonymous { .. } => None,
        }
    }

    fn rate_key(&self) -> String {
        match self {
            Caller::Principal(p) => format!("principal:{}", p.id),
            Caller::Anonymous { ip: Some(ip) } => format!("ip:{ip}"),
            Caller::Anonymous { ip: None } => "ip:unknown".to_owned(),
        }
    }
}

/// What callers without a credential may do when public access is on.
pub fn anonymous_permissions() -> PermissionSet {
    [Permission::Send, Permission::Read].into_iter().collect()
}

/// An admitted request with the rate-limit state to report back.
#[derive(Debug, Clone)]
pub struct Admission {
    pub caller: Caller,
    pub rate: RateDecision,
}

pub struct AdmissionGate {
    store: Arc<dyn PrincipalStore>,
    limiter: SlidingWindowLimiter,
    policy: ConfigStore<AdmissionPolicy>,
}

impl AdmissionGate {
    pub fn new(store: Arc<dyn PrincipalStore>, policy: ConfigStore<AdmissionPolicy>) -> Self {
        Self {
            store,
            limiter: SlidingWindowLimiter::new(),
            policy,
        }
    }

    pub async fn authorize(
        &self,
        credential: Option<&str>,
        client_ip: Option<IpAddr>,
        required: Permission,
    ) -> Result<Admission, AdmissionError> {
        self.authorize_at(credential, client_ip, required, OffsetDateTime::now_utc())
            .await
    }

    /// Decide whether a request may proceed.
    ///
    /// A present credential is always checked, even when public access is
    /// enabled. The permission check runs before the limiter so rejected
    /// requests do not consume quota.
    pub async fn authorize_at(
        &self,
        credential: Option<&str>,
        client_ip: Option<IpAddr>,
        required: Permission,
        now: OffsetDateTime,
    ) -> Result<Admission, AdmissionError> {
        let policy = self.policy.snapshot().await;

        let (caller, max) = match credential {
            Some(raw) => {
                let key = ApiKey::parse(raw).map_err(|_| AdmissionError::InvalidCredential)?;
                let principal = self
                    .store
                    .validate(&key)
                    .await?
                    .filter(|p| p.active)
                    .ok_or(AdmissionError::InvalidCredential)?;
                if !principal.permissions.contains(required) {
                    tracing::debug!(principal = %principal.name, %required, "Permission denied");
                    return Err(AdmissionError::Forbidden(required));
                }
                let max = principal.rate_limit;
                (Caller::Principal(principal), max)
            }
            None if policy.public_access => {
                if !anonymous_permissions().contains(required) {
                    return Err(AdmissionError::AuthRequired);
                }
                (Caller::Anonymous { ip: client_ip }, policy.public_rate_limit)
            }
            None => return Err(AdmissionError::AuthRequired),
        };

        let rate = self
            .limiter
            .hit(&caller.rate_key(), max, policy.window, now)
            .await;
        if !rate.allowed {
            tracing::info!(key = %caller.rate_key(), limit = rate.limit, "Rate limit exceeded");
            return Err(AdmissionError::RateLimitExceeded(rate));
        }

        if let Caller::Principal(principal) = &caller {
            let store = Arc::clone(&self.store);
            let id = principal.id;
            tokio::spawn(async move {
                if let Err(e) = store.touch_last_used(id, now).await {
                    tracing::warn!(error = %e, principal = %id, "Failed to record key usage");
                }
            });
        }

        Ok(Admission { caller, rate })
    }

    /// Forget rate-limit keys that went idle. Returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let window = self.policy.read().await.window;
        self.limiter.sweep(window, OffsetDateTime::now_utc()).await
    }
}
