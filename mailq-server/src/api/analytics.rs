//! `GET /analytics?range=7d|30d|90d` – aggregated delivery analytics.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use mailq_sdk::objects::{AnalyticsSummary, TimeRange};
use serde::Deserialize;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    range: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/analytics", get(analytics))
}

async fn analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsSummary>, ApiError> {
    let range = match query.range.as_deref() {
        None => TimeRange::default(),
        Some(raw) => raw
            .parse::<TimeRange>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    };
    Ok(Json(state.service.analytics(range).await))
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use axum::http::StatusCode;
    use mailq_core::entities::{EventContext, EventType};
    use mailq_sdk::objects::{AnalyticsSummary, TimeRange};

    #[tokio::test]
    async fn test_default_range_is_seven_days() {
        let app = TestApp::new().await;
        let job = app.sent_job().await;
        for event in [EventType::Sent, EventType::Delivered] {
            app.tracker
                .record(
                    job.id,
                    event,
                    job.primary_recipient().to_owned(),
                    EventContext::default(),
                )
                .await;
        }
        app.state
            .service
            .track(job.id, EventType::Opened, None, EventContext::default())
            .await
            .unwrap();

        let response = app.request(get("/api/v1/analytics", Some(ADMIN_KEY))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let summary: AnalyticsSummary = json_body(response).await;
        assert_eq!(summary.range, TimeRange::Week);
        assert_eq!(summary.time_series.len(), 7);
        assert_eq!(summary.counts.sent, 1);
        assert_eq!(summary.counts.delivered, 1);
        assert_eq!(summary.counts.opened, 1);
        assert_eq!(summary.rates.delivery_rate, 100.0);
        assert_eq!(summary.rates.open_rate, 100.0);
    }

    #[tokio::test]
    async fn test_explicit_range() {
        let app = TestApp::new().await;
        let response = app
            .request(get("/api/v1/analytics?range=30d", Some(ADMIN_KEY)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let summary: AnalyticsSummary = json_body(response).await;
        assert_eq!(summary.time_series.len(), 30);
        assert_eq!(summary.counts.total(), 0);
    }

    #[tokio::test]
    async fn test_unknown_range_is_rejected() {
        let app = TestApp::new().await;
        let response = app
            .request(get("/api/v1/analytics?range=1y", Some(ADMIN_KEY)))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analytics_requires_permission() {
        let app = TestApp::new().await;
        let response = app.request(get("/api/v1/analytics", Some(READER_KEY))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
