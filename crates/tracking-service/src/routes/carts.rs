//! Cart event and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::CorrelationId;
use saga::{CartEvent, HandleOutcome, SagaError};
use saga_store::{SagaRecord, StoreError};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub id: String,
    pub state: String,
    pub created: String,
    pub updated: String,
    pub user_name: Option<String>,
    pub expiration_id: Option<String>,
    pub order_id: Option<String>,
    pub version: i64,
}

impl From<SagaRecord> for CartResponse {
    fn from(record: SagaRecord) -> Self {
        Self {
            id: record.correlation_id.to_string(),
            state: record.current_state,
            created: record.created.to_rfc3339(),
            updated: record.updated.to_rfc3339(),
            user_name: record.user_name,
            expiration_id: record.expiration_id.map(|id| id.to_string()),
            order_id: record.order_id.map(|id| id.to_string()),
            version: record.version.as_i64(),
        }
    }
}

#[derive(Serialize)]
pub struct EventHandledResponse {
    pub id: String,
    /// `"transitioned"` or `"ignored"`.
    pub outcome: &'static str,
    pub state: String,
}

// -- Handlers --

/// POST /carts/:id/events: apply one cart event.
#[tracing::instrument(skip(state, body))]
pub async fn handle_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<CartEvent>, JsonRejection>,
) -> Result<Json<EventHandledResponse>, ApiError> {
    let correlation_id = parse_correlation_id(&id)?;
    let Json(event) = body?;

    let outcome = state.runtime.handle(correlation_id, &event).await?;
    let (outcome, cart_state) = match outcome {
        HandleOutcome::Transitioned { to, .. } => ("transitioned", to),
        HandleOutcome::Ignored { state } => ("ignored", state),
    };

    Ok(Json(EventHandledResponse {
        id: correlation_id.to_string(),
        outcome,
        state: cart_state.to_string(),
    }))
}

/// GET /carts/:id: load the persisted cart.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let correlation_id = parse_correlation_id(&id)?;

    match state.runtime.instance(correlation_id).await {
        Ok(record) => Ok(Json(CartResponse::from(record))),
        Err(SagaError::Store(StoreError::NotFound(_))) => {
            Err(ApiError::NotFound(format!("Cart {id} not found")))
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_correlation_id(id: &str) -> Result<CorrelationId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
