//! Scheduler queue endpoints.
//!
//! Accept the same commands the scheduler queue carries. Payloads are given
//! as JSON and republished as their JSON encoding.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use scheduler::{CancelScheduledMessage, ScheduleMessage};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub token: String,
    pub destination: String,
    pub payload: serde_json::Value,
    /// Defaults to now.
    pub delivery_time: Option<DateTime<Utc>>,
}

// -- Response types --

#[derive(Serialize)]
pub struct JobResponse {
    pub token: String,
    pub status: String,
}

// -- Handlers --

/// POST /scheduler/schedule: schedule or replace a delivery.
#[tracing::instrument(skip(state, body))]
pub async fn schedule(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    if req.token.is_empty() {
        return Err(ApiError::BadRequest("token must not be empty".to_string()));
    }
    if req.destination.is_empty() {
        return Err(ApiError::BadRequest(
            "destination must not be empty".to_string(),
        ));
    }

    let message = ScheduleMessage::json(
        req.token,
        req.destination,
        &req.payload,
        req.delivery_time.unwrap_or_else(Utc::now),
    )
    .map_err(|e| ApiError::BadRequest(format!("Invalid payload: {e}")))?;
    state.bridge.schedule_message(message).await?;

    Ok(StatusCode::ACCEPTED)
}

/// POST /scheduler/cancel: cancel a pending delivery; unknown tokens are fine.
#[tracing::instrument(skip(state, body))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CancelScheduledMessage>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(msg) = body?;
    state.bridge.cancel_scheduled_message(msg).await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /scheduler/jobs/:token: last known status of a job.
#[tracing::instrument(skip(state))]
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let status = state
        .bridge
        .status(&token)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Job {token} not found")))?;

    Ok(Json(JobResponse {
        token,
        status: status.to_string(),
    }))
}
