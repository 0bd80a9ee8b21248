//! Effect dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use scheduler::{CancelScheduledMessage, ScheduleMessage, SchedulerBridge};
use tokio::sync::Mutex;

use crate::error::{Result, SagaError};
use crate::machine::Effect;

/// Carries out effects produced by a transition.
#[async_trait]
pub trait EffectDispatcher: Send + Sync {
    async fn dispatch(&self, effect: &Effect) -> Result<()>;
}

#[async_trait]
impl EffectDispatcher for SchedulerBridge {
    async fn dispatch(&self, effect: &Effect) -> Result<()> {
        match effect {
            Effect::Noop => Ok(()),
            Effect::Schedule {
                token,
                destination,
                payload,
                delay,
            } => {
                let delivery_time = chrono::Duration::from_std(*delay)
                    .ok()
                    .and_then(|delay| Utc::now().checked_add_signed(delay))
                    .ok_or_else(|| {
                        SagaError::InvalidEffect(format!("delay {delay:?} is out of range"))
                    })?;
                let message = ScheduleMessage::new(
                    token.clone(),
                    destination.clone(),
                    serde_json::to_vec(payload)?,
                    delivery_time,
                );
                self.schedule_message(message).await?;
                Ok(())
            }
            Effect::Cancel { token } => {
                self.cancel_scheduled_message(CancelScheduledMessage::new(token.clone()))
                    .await?;
                Ok(())
            }
        }
    }
}

/// In-memory dispatcher for testing.
///
/// Records every dispatched effect and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    effects: Arc<Mutex<Vec<Effect>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every dispatch while set.
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.lock().await = fail;
    }

    pub async fn dispatched(&self) -> Vec<Effect> {
        self.effects.lock().await.clone()
    }
}

#[async_trait]
impl EffectDispatcher for RecordingDispatcher {
    async fn dispatch(&self, effect: &Effect) -> Result<()> {
        if *self.fail.lock().await {
            return Err(SagaError::InvalidEffect(
                "simulated dispatch failure".to_string(),
            ));
        }
        self.effects.lock().await.push(effect.clone());
        Ok(())
    }
}
