//! Commands consumed from the scheduler queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deliver `payload` to `destination` at `delivery_time`.
///
/// Scheduling a token that is already pending replaces that job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleMessage {
    pub destination: String,
    pub payload: Vec<u8>,
    pub delivery_time: DateTime<Utc>,
    pub token: String,
}

impl ScheduleMessage {
    pub fn new(
        token: impl Into<String>,
        destination: impl Into<String>,
        payload: Vec<u8>,
        delivery_time: DateTime<Utc>,
    ) -> Self {
        Self {
            destination: destination.into(),
            payload,
            delivery_time,
            token: token.into(),
        }
    }

    /// Schedules a JSON-encoded message.
    pub fn json<T: Serialize>(
        token: impl Into<String>,
        destination: impl Into<String>,
        message: &T,
        delivery_time: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            token,
            destination,
            serde_json::to_vec(message)?,
            delivery_time,
        ))
    }
}

/// Cancel the pending job for `token`, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelScheduledMessage {
    pub token: String,
}

impl CancelScheduledMessage {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_payload_is_encoded_verbatim() {
        let at = Utc::now();
        let msg = ScheduleMessage::json("T1", "cart_state", &serde_json::json!({"a": 1}), at)
            .unwrap();

        assert_eq!(msg.token, "T1");
        assert_eq!(msg.destination, "cart_state");
        assert_eq!(msg.payload, br#"{"a":1}"#.to_vec());
        assert_eq!(msg.delivery_time, at);
    }

    #[test]
    fn commands_deserialize_from_queue_json() {
        let cancel: CancelScheduledMessage = serde_json::from_str(r#"{"token":"T9"}"#).unwrap();
        assert_eq!(cancel, CancelScheduledMessage::new("T9"));
    }
}
