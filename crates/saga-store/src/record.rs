use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CorrelationId;

/// Maximum length of a persisted state name.
pub const MAX_STATE_LEN: usize = 80;

/// Version number for a saga record, used for optimistic concurrency control.
///
/// A record that has never been saved is at version 0; every successful save
/// increments the version by 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a record that was never persisted.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first persisted version (1).
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// The persisted form of one saga instance.
///
/// `current_state` is stored as the state's name; the state machine owns the
/// closed set of names and parses them back. The remaining domain attributes
/// are opaque to the store and carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaRecord {
    /// Primary key.
    pub correlation_id: CorrelationId,

    /// Name of the current state.
    pub current_state: String,

    /// When the instance was first created. Set once.
    pub created: DateTime<Utc>,

    /// When the instance was last saved.
    pub updated: DateTime<Utc>,

    pub user_name: Option<String>,
    pub expiration_id: Option<Uuid>,
    pub order_id: Option<Uuid>,

    /// Version the record was loaded at (0 if never persisted).
    pub version: Version,
}

impl SagaRecord {
    /// Creates a fresh, unsaved record in the given state.
    pub fn new(correlation_id: CorrelationId, initial_state: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            correlation_id,
            current_state: initial_state.into(),
            created: now,
            updated: now,
            user_name: None,
            expiration_id: None,
            order_id: None,
            version: Version::initial(),
        }
    }

    /// Returns true if the record has never been saved.
    pub fn is_new(&self) -> bool {
        self.version == Version::initial()
    }
}

/// Error returned when a record violates a field constraint.
#[derive(Debug, Clone)]
pub struct RecordValidationError {
    pub message: String,
}

impl std::fmt::Display for RecordValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Record validation error: {}", self.message)
    }
}

impl std::error::Error for RecordValidationError {}

/// Validates a record before it is written.
pub fn validate_record(record: &SagaRecord) -> std::result::Result<(), RecordValidationError> {
    if record.current_state.is_empty() {
        return Err(RecordValidationError {
            message: "current_state must not be empty".to_string(),
        });
    }
    if record.current_state.chars().count() > MAX_STATE_LEN {
        return Err(RecordValidationError {
            message: format!(
                "current_state '{}' exceeds {} characters",
                record.current_state, MAX_STATE_LEN
            ),
        });
    }
    if record.updated < record.created {
        return Err(RecordValidationError {
            message: "updated must not precede created".to_string(),
        });
    }
    Ok(())
}
