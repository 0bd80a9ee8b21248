//! Service and API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::SagaError;
use saga_store::StoreError;
use scheduler::SchedulerError;
use thiserror::Error;

/// Errors raised while starting the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga handling error.
    Saga(SagaError),
    /// Scheduler command error.
    Scheduler(SchedulerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Scheduler(err) => scheduler_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn store_error_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
        StoreError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
        StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let status = match &err {
        SagaError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SagaError::Store(store_err) => store_error_status(store_err),
        SagaError::Scheduler(SchedulerError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn scheduler_error_to_response(err: SchedulerError) -> (StatusCode, String) {
    let status = match &err {
        SchedulerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SchedulerError::Serialization(_) => StatusCode::BAD_REQUEST,
    };
    (status, err.to_string())
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        ApiError::Scheduler(err)
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
