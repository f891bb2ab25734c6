//! `POST /emails` – queue an email for delivery.

use axum::{
    Extension, Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};
use mailq_core::admission::Admission;
use mailq_core::entities::JobSpec;
use mailq_sdk::objects::{SendEmailRequest, SendEmailResponse};

use super::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/emails", post(send_email))
}

/// Validate the submission and queue it. Delivery happens later; the
/// caller polls `GET /emails/{id}` for the outcome.
async fn send_email(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
    payload: Result<Json<SendEmailRequest>, JsonRejection>,
) -> Result<Json<SendEmailResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let spec = JobSpec::try_from(request).map_err(ApiError::Validation)?;

    let job = state.service.submit(spec).await;
    tracing::debug!(
        job_id = %job.id,
        principal = ?admission.caller.principal_id(),
        "Submission accepted"
    );
    Ok(Json(SendEmailResponse::queued(job.id)))
}
