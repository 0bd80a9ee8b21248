//! Per-correlation-id mutual exclusion.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::CorrelationId;

/// Hands out one async mutex per correlation id.
///
/// Unrelated ids never contend. Entries nobody holds are pruned on the next
/// acquisition.
#[derive(Clone, Default)]
pub struct KeyedLock {
    slots: Arc<Mutex<HashMap<CorrelationId, Arc<Mutex<()>>>>>,
}

/// Held while a correlation id is being mutated.
pub struct KeyGuard {
    correlation_id: CorrelationId,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    /// The id this guard protects.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no one else holds `correlation_id`, then takes it.
    pub async fn lock(&self, correlation_id: CorrelationId) -> KeyGuard {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.retain(|id, slot| *id == correlation_id || Arc::strong_count(slot) > 1);
            slots
                .entry(correlation_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        KeyGuard {
            correlation_id,
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of ids currently tracked (held or awaiting pruning).
    pub async fn tracked(&self) -> usize {
        self.slots.lock().await.len()
    }
}
