//! In-process router harness for handler tests.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, header};
use mailq_core::admission::{AdmissionGate, ApiKey};
use mailq_core::config::{AdmissionPolicy, AnalyticsConfig, ConfigStore};
use mailq_core::entities::{Job, JobSpec, Permission, Principal, StoredPrincipal};
use mailq_core::queue::JobQueue;
use mailq_core::service::MailService;
use mailq_core::store::MemoryStore;
use mailq_core::tracker::{EventTracker, NoGeoLookup};
use mailq_sdk::signature::API_KEY_HEADER;
use serde::de::DeserializeOwned;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use crate::server::build_router;
use crate::state::AppState;

/// Holds every permission.
pub const ADMIN_KEY: &str = "mq_tester_s3cr3t";
/// Holds `read` only.
pub const READER_KEY: &str = "mq_reader_s3cr3t";
/// Every permission, two requests per window.
pub const LIMITED_KEY: &str = "mq_limited_s3cr3t";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub queue: Arc<JobQueue>,
    pub tracker: Arc<EventTracker>,
    pub admission: ConfigStore<AdmissionPolicy>,
}

fn stored(key: &str, name: &str, permissions: &[Permission], rate_limit: u32) -> StoredPrincipal {
    let key = ApiKey::parse(key).unwrap();
    StoredPrincipal {
        principal: Principal {
            id: Uuid::now_v7(),
            name: name.to_owned(),
            permissions: permissions.iter().copied().collect(),
            rate_limit,
            active: true,
            last_used_at: None,
        },
        key_prefix: key.prefix().to_owned(),
        key_hash: key.hash(),
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_trusted_proxies(Vec::new()).await
    }

    pub async fn with_trusted_proxies(trusted_proxies: Vec<IpAddr>) -> Self {
        let store = Arc::new(MemoryStore::new());
        store
            .replace_principals(vec![
                stored(ADMIN_KEY, "tester", &Permission::ALL, 100),
                stored(READER_KEY, "reader", &[Permission::Read], 100),
                stored(LIMITED_KEY, "limited", &Permission::ALL, 2),
            ])
            .await;

        let queue = Arc::new(JobQueue::new());
        let tracker = Arc::new(EventTracker::new(
            AnalyticsConfig::default(),
            Arc::new(NoGeoLookup),
            None,
        ));
        let admission = ConfigStore::new(AdmissionPolicy::default());
        let state = AppState {
            gate: Arc::new(AdmissionGate::new(store.clone(), admission.clone())),
            service: Arc::new(MailService::new(queue.clone(), tracker.clone(), store)),
            trusted_proxies: trusted_proxies.into(),
        };
        Self {
            router: build_router(state.clone()),
            state,
            queue,
            tracker,
            admission,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Submit a job and push it straight to `sent`.
    pub async fn sent_job(&self) -> Job {
        let job = self
            .state
            .service
            .submit(JobSpec::text(&["reader@example.com"], "hello", "body"))
            .await;
        let now = OffsetDateTime::now_utc() + time::Duration::seconds(1);
        self.queue.claim_batch(now, 10).await;
        self.queue.mark_sent(job.id, now).await.unwrap()
    }
}

pub fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, key: Option<&str>, body: &serde_json::Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header(API_KEY_HEADER, key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Attach the socket peer the router would see behind `ConnectInfo`.
pub fn from_peer(mut request: Request<Body>, peer: [u8; 4]) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
    request
}

pub async fn json_body<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
