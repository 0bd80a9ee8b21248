//! Outbound transport for fired jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::error::PublishError;

/// Sends a payload to a named destination queue.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, destination: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// A message handed to a publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub destination: String,
    pub payload: Vec<u8>,
}

/// Publisher that forwards onto an unbounded channel.
///
/// Fails with [`PublishError::Unreachable`] once the receiving side is gone.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<PublishedMessage>,
}

impl ChannelPublisher {
    pub fn new(sender: mpsc::UnboundedSender<PublishedMessage>) -> Self {
        Self { sender }
    }

    /// Creates a publisher together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PublishedMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl MessagePublisher for ChannelPublisher {
    async fn publish(&self, destination: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.sender
            .send(PublishedMessage {
                destination: destination.to_string(),
                payload: payload.to_vec(),
            })
            .map_err(|_| PublishError::Unreachable(format!("queue '{destination}' is closed")))
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    published: Vec<PublishedMessage>,
    attempts: usize,
    transient_failures: usize,
    reject: bool,
}

/// In-memory publisher for testing.
///
/// Records every successful publish and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<Mutex<RecordingState>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` publishes with a transient error.
    pub async fn set_transient_failures(&self, count: usize) {
        self.state.lock().await.transient_failures = count;
    }

    /// Rejects every publish with a permanent error while set.
    pub async fn set_reject(&self, reject: bool) {
        self.state.lock().await.reject = reject;
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().await.published.clone()
    }

    pub async fn publish_count(&self) -> usize {
        self.state.lock().await.published.len()
    }

    /// Number of publish calls, failed or not.
    pub async fn attempts(&self) -> usize {
        self.state.lock().await.attempts
    }

    /// Polls until at least `count` messages were published or `timeout` elapses.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.publish_count().await >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl MessagePublisher for InMemoryPublisher {
    async fn publish(&self, destination: &str, payload: &[u8]) -> Result<(), PublishError> {
        let mut state = self.state.lock().await;
        state.attempts += 1;

        if state.reject {
            return Err(PublishError::Rejected(format!(
                "simulated rejection by '{destination}'"
            )));
        }
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(PublishError::Unreachable(format!(
                "simulated outage of '{destination}'"
            )));
        }

        state.published.push(PublishedMessage {
            destination: destination.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
