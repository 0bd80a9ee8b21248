//! Health and Prometheus metrics endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use scheduler::RunState;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
    pub scheduler: String,
}

/// GET /health: reports storage and scheduler state.
///
/// Responds 503 once either has stopped.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let storage_open = state.provider.is_open().await;
    let run_state = state.bridge.scheduler().run_state().await;
    let healthy = storage_open && run_state == RunState::Running;

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        storage: if storage_open { "open" } else { "closed" },
        scheduler: run_state.to_string(),
    };
    (status, Json(body))
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
