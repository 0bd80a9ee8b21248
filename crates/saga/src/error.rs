//! Saga error types.

use common::CorrelationId;
use saga_store::StoreError;
use scheduler::SchedulerError;
use thiserror::Error;

/// Errors that can occur while handling saga events.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The event is explicitly not allowed in the instance's current state.
    #[error("Event '{event}' is not allowed for saga {correlation_id} in state {state}")]
    InvalidTransition {
        correlation_id: CorrelationId,
        state: String,
        event: &'static str,
    },

    /// The persisted state name is not a member of the state set.
    #[error("Saga {correlation_id} has unknown state '{state}'")]
    CorruptState {
        correlation_id: CorrelationId,
        state: String,
    },

    /// An effect could not be turned into a scheduler command.
    #[error("Invalid effect: {0}")]
    InvalidEffect(String),

    /// Saga store error.
    #[error("Saga store error: {0}")]
    Store(#[from] StoreError),

    /// Scheduler error.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Returns true for an optimistic-concurrency conflict on save.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SagaError::Store(e) if e.is_conflict())
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
