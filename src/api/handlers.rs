//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use tracing::error;

use super::AppState;
use super::types::{ErrorResponse, RootResponse};
use crate::observation::Observation;
use crate::service::{Health, Prediction, ServiceError, ServiceState};

type ApiError = (StatusCode, Json<ErrorResponse>);

/// `GET /` → 200 + readiness banner.
pub async fn get_root(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    let body = match state.service.state() {
        ServiceState::Ready => RootResponse {
            status: "ok",
            message: "Solar forecasting API is ready",
        },
        ServiceState::Uninitialized => RootResponse {
            status: "warning",
            message: "service running but model not loaded",
        },
    };
    Json(body)
}

/// `GET /health` → 200 + `Health` JSON, in either lifecycle state.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(state.service.health())
}

/// Runs one observation through the inference pipeline.
///
/// `POST /predict` → 200 + `Prediction` JSON
/// - 400/415/422 if the body is not a well-formed observation
/// - 422 + field/bound detail if the observation is implausible
/// - 500 on predictor failure (details stay in the server log)
/// - 503 if artifacts are not loaded
///
/// The pipeline runs on the blocking pool because the audit append does file
/// I/O under a lock.
pub async fn post_predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Observation>, JsonRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let Json(observation) = payload.map_err(|rejection| {
        (
            rejection.status(),
            Json(ErrorResponse::message(rejection.body_text())),
        )
    })?;

    // Logging appends to a file under a mutex, so keep it off the async workers.
    let outcome = tokio::task::spawn_blocking(move || state.service.predict(observation))
        .await
        .map_err(|err| {
            error!(error = %err, "prediction task did not complete");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::message("internal processing error")),
            )
        })?;

    outcome.map(Json).map_err(|err| match err {
        ServiceError::Validation(ref v) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse::from(v)))
        }
        ServiceError::Internal(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::message("internal processing error")),
        ),
        ServiceError::Unavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::message("model is not loaded")),
        ),
    })
}
