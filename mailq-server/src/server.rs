//! Axum server setup and router configuration.

use crate::api;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api::router(state.clone()))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Run the server with graceful shutdown support.
pub async fn run_server(router: Router, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);
    serve(listener, router, shutdown_signal()).await
}

/// Serve `router` on an already bound listener until `shutdown` completes.
///
/// Connection info is attached so handlers can fall back to the socket
/// address when no `X-Forwarded-For` header is present.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{ADMIN_KEY, READER_KEY, TestApp};
    use mailq_sdk::client::MailClient;
    use mailq_sdk::objects::{
        EventType, JobStatus, SendEmailRequest, TimeRange, TrackEventRequest,
    };
    use tokio::sync::oneshot;
    use url::Url;

    #[tokio::test]
    async fn test_client_round_trip_over_http() {
        let app = TestApp::new().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, app.router.clone(), async {
            let _ = stop_rx.await;
        }));

        let base = Url::parse(&format!("http://{addr}")).unwrap();
        let client = MailClient::new(base.clone(), ADMIN_KEY);

        let queued = client
            .send_email(&SendEmailRequest {
                to: "a@example.com".into(),
                subject: "Receipt".to_owned(),
                text: Some("thanks".to_owned()),
                html: None,
                cc: None,
                bcc: None,
                attachments: Vec::new(),
                scheduled_for: None,
            })
            .await
            .unwrap();
        assert_eq!(queued.status, "queued");

        let job = client.get_email(queued.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(client.queue_stats().await.unwrap().pending, 1);

        let sent = app.sent_job().await;
        client
            .track_event(&TrackEventRequest {
                job_id: sent.id,
                event: EventType::Opened,
                recipient: None,
                user_agent: None,
                ip_address: None,
            })
            .await
            .unwrap();
        let summary = client.analytics(TimeRange::Month).await.unwrap();
        assert_eq!(summary.counts.opened, 1);
        assert_eq!(summary.time_series.len(), 30);

        let reader = MailClient::new(base, READER_KEY);
        let denied = reader.analytics(TimeRange::Week).await.unwrap_err();
        assert_eq!(denied.status().map(|s| s.as_u16()), Some(403));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
