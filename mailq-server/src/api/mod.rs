//! HTTP API under `/api/v1`.
//!
//! # Endpoints
//!
//! | Route                     | Permission  |
//! |---------------------------|-------------|
//! | `POST /emails`            | `send`      |
//! | `GET  /emails/stats`      | `read`      |
//! | `GET  /emails/{id}`       | `read`      |
//! | `GET  /analytics?range=`  | `analytics` |
//! | `POST /events`            | `track`     |
//! | `GET  /t/open/{job_id}`   | none        |
//! | `GET  /t/click/{job_id}`  | none        |
//!
//! Gated routes pass the admission gate first and carry the
//! `X-RateLimit-*` headers on every response.

mod analytics;
mod extractors;
mod jobs;
mod send;
mod tracking;

#[cfg(test)]
pub(crate) mod testing;

use axum::{
    Json, Router,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware,
    response::{IntoResponse, Response},
};
use mailq_core::admission::AdmissionError;
use mailq_core::entities::{Permission, ValidationError};
use mailq_core::service::TrackError;
use mailq_sdk::objects::ValidationErrorBody;
use serde::Serialize;
use time::OffsetDateTime;

use crate::state::AppState;
use extractors::{Gate, admit, apply_rate_headers};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(gated(&state, Permission::Send, send::router()))
        .merge(gated(&state, Permission::Read, jobs::router()))
        .merge(gated(&state, Permission::Analytics, analytics::router()))
        .merge(gated(&state, Permission::Track, tracking::router()))
        .merge(tracking::pixel_router())
}

fn gated(state: &AppState, permission: Permission, routes: Router<AppState>) -> Router<AppState> {
    let gate = Gate {
        state: state.clone(),
        permission,
    };
    routes.route_layer(middleware::from_fn_with_state(gate, admit))
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Errors returned by API handlers and the admission middleware.
#[derive(Debug)]
pub enum ApiError {
    Admission(AdmissionError),
    Validation(ValidationError),
    BadRequest(String),
    NotFound(&'static str),
    Conflict(String),
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        ApiError::Admission(err)
    }
}

impl From<TrackError> for ApiError {
    fn from(err: TrackError) -> Self {
        match err {
            TrackError::UnknownJob(_) => ApiError::NotFound("job not found"),
            TrackError::NotSent { .. } => ApiError::Conflict(err.to_string()),
            TrackError::LifecycleEvent(_) => ApiError::BadRequest(err.to_string()),
        }
    }
}

fn error(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            message: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(err) => (
                StatusCode::BAD_REQUEST,
                Json(ValidationErrorBody {
                    error: "validation".to_owned(),
                    fields: err.fields,
                }),
            )
                .into_response(),
            ApiError::BadRequest(message) => error(StatusCode::BAD_REQUEST, "bad_request", message),
            ApiError::NotFound(message) => error(StatusCode::NOT_FOUND, "not_found", message),
            ApiError::Conflict(message) => error(StatusCode::CONFLICT, "conflict", message),
            ApiError::Admission(err) => match &err {
                AdmissionError::AuthRequired | AdmissionError::InvalidCredential => {
                    error(StatusCode::UNAUTHORIZED, "unauthorized", err.to_string())
                }
                AdmissionError::Forbidden(_) => {
                    error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
                }
                AdmissionError::RateLimitExceeded(decision) => {
                    let mut response = error(
                        StatusCode::TOO_MANY_REQUESTS,
                        "rate_limited",
                        err.to_string(),
                    );
                    apply_rate_headers(response.headers_mut(), decision);
                    let retry_after = decision.retry_after_secs(OffsetDateTime::now_utc());
                    response
                        .headers_mut()
                        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
                    response
                }
                AdmissionError::Store(e) => {
                    tracing::error!(error = %e, "Principal store unavailable");
                    error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal",
                        "internal server error",
                    )
                }
            },
        }
    }
}
