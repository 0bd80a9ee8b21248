//! Scheduled job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::ScheduleMessage;

/// Lifecycle of a job.
///
/// ```text
/// Pending ──┬──► Fired
///           └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Fired,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Fired => "Fired",
            JobStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message waiting for its trigger time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Caller-supplied key; at most one pending job per token.
    pub token: String,
    pub trigger_time: DateTime<Utc>,
    pub destination: String,
    /// Opaque bytes, republished verbatim.
    pub payload: Vec<u8>,
}

impl ScheduledJob {
    /// Returns true if the job should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.trigger_time <= now
    }
}

impl From<ScheduleMessage> for ScheduledJob {
    fn from(msg: ScheduleMessage) -> Self {
        Self {
            token: msg.token,
            trigger_time: msg.delivery_time,
            destination: msg.destination,
            payload: msg.payload,
        }
    }
}
