use thiserror::Error;

use crate::{CorrelationId, Version};

/// Errors that can occur when interacting with the saga store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrency conflict occurred when saving a saga instance.
    /// Another writer changed the record since it was loaded.
    #[error(
        "Concurrency conflict for saga {correlation_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        correlation_id: CorrelationId,
        expected: Version,
        actual: Version,
    },

    /// No saga instance exists for the correlation id.
    #[error("Saga not found: {0}")]
    NotFound(CorrelationId),

    /// The storage connection cannot be (re)established or has been closed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The record violates a field constraint.
    #[error("Invalid saga record: {0}")]
    InvalidRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Returns true for optimistic-concurrency collisions.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }

    /// Returns true when the record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type for saga store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
