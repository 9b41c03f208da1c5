//! HTTP surface for the review service
//!
//! Thin layer over the consensus engine: rating submission, the open-case
//! feed, the case audit view and a health endpoint. Authentication belongs
//! to the surrounding gateway and is not handled here.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use roadwatch_common::models::{Case, CaseSummary, RatingStatus};
use roadwatch_common::Error;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::AppState;

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ratings", post(submit_rating))
        .route("/ratings/:id/status", patch(override_rating_status))
        .route("/specialists/:id/cases", get(open_cases))
        .route("/cases/:id", get(case_summary))
        .route("/health", get(health_check))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SubmitRatingRequest {
    pub specialist_id: i64,
    pub case_id: i64,
    /// true = the specialist confirms the violation
    pub choice: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitRatingResponse {
    pub rating_id: i64,
}

/// POST /ratings
pub async fn submit_rating(
    State(state): State<AppState>,
    Json(request): Json<SubmitRatingRequest>,
) -> Result<(StatusCode, Json<SubmitRatingResponse>), ApiError> {
    let rating_id = state
        .engine
        .submit_rating(request.specialist_id, request.case_id, request.choice)
        .await?;

    Ok((StatusCode::CREATED, Json(SubmitRatingResponse { rating_id })))
}

#[derive(Debug, Deserialize)]
pub struct OverrideStatusRequest {
    pub status: RatingStatus,
}

/// PATCH /ratings/:id/status
pub async fn override_rating_status(
    State(state): State<AppState>,
    Path(rating_id): Path<i64>,
    Json(request): Json<OverrideStatusRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .override_rating_status(rating_id, request.status)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /specialists/:id/cases
pub async fn open_cases(
    State(state): State<AppState>,
    Path(specialist_id): Path<i64>,
) -> Result<Json<Vec<Case>>, ApiError> {
    let cases = state.engine.open_cases_for(specialist_id).await?;
    Ok(Json(cases))
}

/// GET /cases/:id
pub async fn case_summary(
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
) -> Result<Json<CaseSummary>, ApiError> {
    let summary = state.engine.case_summary(case_id).await?;
    Ok(Json(summary))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "roadwatch-review".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Wrapper mapping the engine's error taxonomy onto HTTP status codes.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Unverified => StatusCode::FORBIDDEN,
            Error::LevelMismatch => StatusCode::FORBIDDEN,
            Error::AlreadyClosed => StatusCode::CONFLICT,
            Error::DuplicateRating => StatusCode::CONFLICT,
            Error::SpecialistNotFound | Error::CaseNotFound | Error::RatingNotFound => {
                StatusCode::NOT_FOUND
            }
            Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Error::Notify(_) => StatusCode::BAD_GATEWAY,
            Error::Storage(_) | Error::Internal(_) | Error::Config(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            error!("request failed: {}", self.0);
        }

        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
