//! Load-or-create and save for saga instances.

use chrono::Utc;

use crate::{CorrelationId, KeyGuard, KeyedLock, Result, SagaRecord, store::SagaRepository};

/// Correlation-keyed saga persistence on top of a [`SagaRepository`].
///
/// Callers that mutate an instance take [`lock`](Self::lock) first; while the
/// guard is held no other caller of this store loads the same id for
/// mutation. Writers outside the lock (another process, a stale copy) are
/// caught by the optimistic check in [`save`](Self::save).
pub struct SagaStore<R: SagaRepository> {
    repository: R,
    initial_state: String,
    locks: KeyedLock,
}

impl<R: SagaRepository> SagaStore<R> {
    /// Creates a store whose fresh instances start in `initial_state`.
    pub fn new(repository: R, initial_state: impl Into<String>) -> Self {
        Self {
            repository,
            initial_state: initial_state.into(),
            locks: KeyedLock::new(),
        }
    }

    /// Gets a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// State name given to instances created by `get_or_create`.
    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    /// Takes exclusive access to a correlation id.
    pub async fn lock(&self, correlation_id: CorrelationId) -> KeyGuard {
        self.locks.lock(correlation_id).await
    }

    /// Returns the stored instance.
    ///
    /// Fails with `StoreError::NotFound` when none exists.
    pub async fn get(&self, correlation_id: CorrelationId) -> Result<SagaRecord> {
        self.repository.get(correlation_id).await
    }

    /// Returns the stored instance or a fresh, unsaved one in the initial state.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, correlation_id: CorrelationId) -> Result<SagaRecord> {
        match self.repository.get(correlation_id).await {
            Ok(record) => Ok(record),
            Err(e) if e.is_not_found() => {
                tracing::debug!("creating new saga instance");
                metrics::counter!("saga_instances_created_total").increment(1);
                Ok(SagaRecord::new(correlation_id, self.initial_state.clone()))
            }
            Err(e) => Err(e),
        }
    }

    /// Persists the full instance and advances its version.
    ///
    /// Sets `updated` to now. On `ConcurrencyConflict` the instance is left
    /// untouched so the caller can reload and retry.
    #[tracing::instrument(skip(self, instance), fields(correlation_id = %instance.correlation_id, state = %instance.current_state))]
    pub async fn save(&self, instance: &mut SagaRecord) -> Result<()> {
        let mut candidate = instance.clone();
        candidate.updated = Utc::now().max(candidate.created);

        let version = self.repository.put(&candidate).await?;
        candidate.version = version;
        *instance = candidate;
        Ok(())
    }
}
