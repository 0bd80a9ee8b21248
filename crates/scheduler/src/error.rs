//! Scheduler error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned by scheduler and bridge operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler has been shut down and accepts no more commands.
    #[error("Scheduler unavailable: {0}")]
    Unavailable(String),

    /// A command payload could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors reported by a [`MessagePublisher`](crate::MessagePublisher).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    /// The destination could not be reached; worth retrying.
    #[error("Destination unreachable: {0}")]
    Unreachable(String),

    /// The transport refused the message; retrying will not help.
    #[error("Publish rejected: {0}")]
    Rejected(String),
}

impl PublishError {
    /// Returns true if the publish may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, PublishError::Unreachable(_))
    }
}

/// Operator-visible report of a republish that exhausted its retries.
///
/// The job it describes is already marked fired and will not fire again.
#[derive(Debug, Clone, Error)]
#[error(
    "Publish of job '{token}' to '{destination}' failed after {attempts} attempt(s): {reason}"
)]
pub struct PublishFailure {
    pub token: String,
    pub destination: String,
    pub attempts: usize,
    pub reason: PublishError,
    pub failed_at: DateTime<Utc>,
}

/// Convenience type alias for scheduler results.
pub type Result<T> = std::result::Result<T, SchedulerError>;
