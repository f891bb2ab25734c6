//! Engagement tracking.
//!
//! - `POST /events`            – report an event for a sent job (`track`)
//! - `GET  /t/open/{job_id}`   – open pixel, embedded in HTML bodies
//! - `GET  /t/click/{job_id}`  – click redirect, `?url=` is the target
//!
//! The pixel and click routes are hit by mail clients, so they carry no
//! credential and never pass the admission gate.

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use mailq_core::admission::Admission;
use mailq_core::entities::{EventContext, EventType};
use mailq_core::service::TrackError;
use mailq_sdk::objects::TrackEventRequest;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use super::ApiError;
use super::extractors::ClientIp;
use crate::state::AppState;

/// 1x1 transparent GIF.
const PIXEL: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

pub fn router() -> Router<AppState> {
    Router::new().route("/events", post(track_event))
}

pub fn pixel_router() -> Router<AppState> {
    Router::new()
        .route("/t/open/{job_id}", get(open_pixel))
        .route("/t/click/{job_id}", get(click_redirect))
}

async fn track_event(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
    payload: Result<Json<TrackEventRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let context = EventContext {
        user_agent: request.user_agent,
        ip_address: request.ip_address,
    };
    let recorded = state
        .service
        .track(request.job_id, request.event, request.recipient, context)
        .await?;
    tracing::debug!(
        event_id = %recorded.id,
        principal = ?admission.caller.principal_id(),
        "Tracking event accepted"
    );
    Ok(StatusCode::ACCEPTED)
}

fn context_from(headers: &HeaderMap, ip: ClientIp) -> EventContext {
    EventContext {
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        ip_address: ip.0,
    }
}

/// Serves the pixel whatever happens to the event; a broken image in the
/// recipient's mail client helps nobody.
async fn open_pixel(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
    ip: ClientIp,
) -> Response {
    let context = context_from(&headers, ip);
    if let Err(e) = state
        .service
        .track(job_id, EventType::Opened, None, context)
        .await
    {
        tracing::debug!(%job_id, error = %e, "Open not recorded");
    }
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/gif")),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache, must-revalidate"),
            ),
        ],
        PIXEL,
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ClickQuery {
    url: String,
}

/// Record a click and send the browser on to the original link.
///
/// Only links of known jobs are followed, so the route cannot be used as an
/// open redirect for arbitrary ids.
async fn click_redirect(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<ClickQuery>,
    headers: HeaderMap,
    ip: ClientIp,
) -> Result<Redirect, ApiError> {
    let target = Url::parse(&query.url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .ok_or_else(|| ApiError::BadRequest("url must be an absolute http(s) URL".to_owned()))?;

    let context = context_from(&headers, ip);
    match state
        .service
        .track(job_id, EventType::Clicked, None, context)
        .await
    {
        Ok(_) => {}
        Err(TrackError::UnknownJob(_)) => return Err(ApiError::NotFound("job not found")),
        Err(e) => tracing::debug!(%job_id, error = %e, "Click not recorded"),
    }
    Ok(Redirect::to(target.as_str()))
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::PIXEL;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use mailq_core::entities::{EventType, JobSpec};
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_track_event_accepted() {
        let app = TestApp::new().await;
        let job = app.sent_job().await;

        let response = app
            .request(post_json(
                "/api/v1/events",
                Some(ADMIN_KEY),
                &json!({
                    "jobId": job.id,
                    "event": "clicked",
                    "userAgent": "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile",
                    "ipAddress": "203.0.113.9"
                }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let events = app.tracker.events_for(job.id).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, EventType::Clicked);
        assert_eq!(events[0].recipient, "reader@example.com");
        assert_eq!(
            events[0].metadata.ip_address,
            Some("203.0.113.9".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn test_track_event_rejections() {
        let app = TestApp::new().await;

        let response = app
            .request(post_json(
                "/api/v1/events",
                Some(ADMIN_KEY),
                &json!({"jobId": Uuid::now_v7(), "event": "opened"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let pending = app
            .state
            .service
            .submit(JobSpec::text(&["a@example.com"], "s", "t"))
            .await;
        let response = app
            .request(post_json(
                "/api/v1/events",
                Some(ADMIN_KEY),
                &json!({"jobId": pending.id, "event": "opened"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let sent = app.sent_job().await;
        let response = app
            .request(post_json(
                "/api/v1/events",
                Some(ADMIN_KEY),
                &json!({"jobId": sent.id, "event": "bounced"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .request(post_json(
                "/api/v1/events",
                Some(ADMIN_KEY),
                &json!({"jobId": sent.id, "event": "teleported"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.tracker.events_for(sent.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_track_requires_permission() {
        let app = TestApp::new().await;
        let job = app.sent_job().await;
        let response = app
            .request(post_json(
                "/api/v1/events",
                Some(READER_KEY),
                &json!({"jobId": job.id, "event": "opened"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_open_pixel() {
        let app = TestApp::new().await;
        let job = app.sent_job().await;

        let request = Request::get(format!("/api/v1/t/open/{}", job.id))
            .header(header::USER_AGENT, "Thunderbird/115.0")
            .body(Body::empty())
            .unwrap();
        let response = app.request(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &PIXEL[..]);

        let events = app.tracker.events_for(job.id).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, EventType::Opened);

        // Unknown jobs still get the image, but nothing is recorded.
        let unknown = Uuid::now_v7();
        let response = app
            .request(get(&format!("/api/v1/t/open/{unknown}"), None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(app.tracker.events_for(unknown).await.is_empty());
    }

    #[tokio::test]
    async fn test_click_redirect() {
        let app = TestApp::new().await;
        let job = app.sent_job().await;

        let response = app
            .request(get(
                &format!(
                    "/api/v1/t/click/{}?url=https%3A%2F%2Fexample.com%2Fpricing%3Fref%3Dmail",
                    job.id
                ),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://example.com/pricing?ref=mail"
        );
        let events = app.tracker.events_for(job.id).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, EventType::Clicked);
    }

    #[tokio::test]
    async fn test_click_rejections() {
        let app = TestApp::new().await;
        let job = app.sent_job().await;

        let response = app
            .request(get(
                &format!("/api/v1/t/click/{}?url=javascript%3Aalert(1)", job.id),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .request(get(
                &format!(
                    "/api/v1/t/click/{}?url=https%3A%2F%2Fexample.com",
                    Uuid::now_v7()
                ),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(app.tracker.events_for(job.id).await.is_empty());
    }
}
