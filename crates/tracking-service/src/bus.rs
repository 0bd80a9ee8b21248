//! In-process message bus.
//!
//! Fired scheduler jobs are published onto a channel. The bus consumes it and
//! feeds messages addressed to the cart-state queue back into the runtime;
//! messages for any other destination are logged and dropped.
//!
//! A single task handles messages in arrival order, so scheduler-delivered
//! events for different carts are processed one after another. HTTP requests
//! still reach the runtime concurrently; the bus only serializes its own
//! backlog, which is enough for one node with an in-process queue.

use std::sync::Arc;

use saga::{CartEnvelope, SagaError};
use scheduler::PublishedMessage;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::CartRuntime;

/// Consumes published messages for the cart-state queue.
pub struct CartBus {
    runtime: Arc<CartRuntime>,
    queue: String,
}

/// Running bus task.
pub struct BusHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl BusHandle {
    /// Handles every message already queued, then stops the bus.
    pub async fn drain(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Bus task terminated abnormally");
        }
    }
}

impl CartBus {
    pub fn new(runtime: Arc<CartRuntime>, queue: impl Into<String>) -> Self {
        Self {
            runtime,
            queue: queue.into(),
        }
    }

    /// Spawns the consuming task.
    pub fn spawn(self, mut inbox: mpsc::UnboundedReceiver<PublishedMessage>) -> BusHandle {
        let (stop, mut stopped) = oneshot::channel();

        let task = tokio::spawn(async move {
            info!(queue = %self.queue, "Bus consuming");
            loop {
                tokio::select! {
                    message = inbox.recv() => match message {
                        Some(message) => self.deliver(message).await,
                        None => break,
                    },
                    _ = &mut stopped => {
                        while let Ok(message) = inbox.try_recv() {
                            self.deliver(message).await;
                        }
                        break;
                    }
                }
            }
            info!(queue = %self.queue, "Bus stopped");
        });

        BusHandle { stop, task }
    }

    /// Routes one message. Handling errors are logged, never propagated.
    pub async fn deliver(&self, message: PublishedMessage) {
        if message.destination != self.queue {
            warn!(destination = %message.destination, "No consumer for destination, dropping");
            metrics::counter!("bus_messages_dropped_total").increment(1);
            return;
        }

        let envelope = match CartEnvelope::from_bytes(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Undecodable cart message, dropping");
                metrics::counter!("bus_messages_dropped_total").increment(1);
                return;
            }
        };

        let correlation_id = envelope.correlation_id;
        match self.runtime.handle(correlation_id, &envelope.event).await {
            Ok(outcome) => debug!(%correlation_id, ?outcome, "Bus message handled"),
            Err(e @ SagaError::InvalidTransition { .. }) => {
                warn!(%correlation_id, error = %e, "Bus message rejected");
            }
            Err(e) => {
                tracing::error!(%correlation_id, error = %e, "Bus message failed");
                metrics::counter!("bus_messages_failed_total").increment(1);
            }
        }
    }
}
