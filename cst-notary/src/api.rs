//! HTTP API

use std::sync::Arc;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use cst_types::messages::ErrorResponse;
use cst_types::{CommitSummary, Digest, StampRequest, StampResponse, StateResponse};
use serde::Serialize;

use crate::error::CommitError;
use crate::service::{NotaryService, ServiceError};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    commit_state: String,
    queued: usize,
}

pub fn router(service: Arc<NotaryService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stamp", post(stamp))
        .route("/api/commit", post(commit))
        .route("/api/state/:hash", get(state))
        .with_state(service)
}

async fn health(State(service): State<Arc<NotaryService>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        commit_state: service.orchestrator().state().to_string(),
        queued: service.queued(),
    })
}

async fn stamp(
    State(service): State<Arc<NotaryService>>,
    Json(request): Json<StampRequest>,
) -> ApiResult<StampResponse> {
    service.stamp(request).map(Json).map_err(to_http_error)
}

async fn commit(State(service): State<Arc<NotaryService>>) -> ApiResult<CommitSummary> {
    service.commit_queued().await.map(Json).map_err(to_http_error)
}

async fn state(
    State(service): State<Arc<NotaryService>>,
    Path(hash): Path<String>,
) -> ApiResult<StateResponse> {
    let hash = Digest::from_hex(&hash).map_err(|err| error(StatusCode::BAD_REQUEST, err.to_string()))?;
    match service.state(&hash).await.map_err(to_http_error)? {
        Some(state) => Ok(Json(state)),
        None => Err(error(StatusCode::NOT_FOUND, format!("Unknown hash {}", hash))),
    }
}

fn error(status: StatusCode, message: String) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: message }))
}

fn to_http_error(err: ServiceError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        ServiceError::Commit(CommitError::CommitInProgress) => StatusCode::CONFLICT,
        ServiceError::Commit(CommitError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Commit(CommitError::Submission(_) | CommitError::Chain(_)) => StatusCode::BAD_GATEWAY,
        ServiceError::Commit(CommitError::ConfirmationTimeout { .. } | CommitError::SubmissionTimeout(_)) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error(status, err.to_string())
}
