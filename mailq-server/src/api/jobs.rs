//! Job status endpoints.
//!
//! - `GET /emails/stats` – job counts per status
//! - `GET /emails/{id}`  – one job's delivery status

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use mailq_sdk::objects::{JobResponse, QueueStats};
use uuid::Uuid;

use super::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/emails/stats", get(queue_stats))
        .route("/emails/{id}", get(get_email))
}

async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.service.stats().await)
}

async fn get_email(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state
        .service
        .get(id)
        .await
        .ok_or(ApiError::NotFound("job not found"))?;
    Ok(Json(job.to_response()))
}
