//! Applies events to saga instances.

use std::time::{Duration, Instant};

use backon::Retryable;
use common::{CorrelationId, RetryPolicy};
use saga_store::{SagaRecord, SagaRepository, SagaStore};
use tracing::{info, warn};

use crate::dispatch::EffectDispatcher;
use crate::error::{Result, SagaError};
use crate::machine::{Effect, StateMachine, Transition};

/// What `handle` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome<S> {
    /// The instance moved (possibly to the same state) and was saved.
    Transitioned { from: S, to: S },
    /// The table has no entry for the event in this state; nothing changed.
    Ignored { state: S },
}

/// Drives one saga type.
///
/// Each event is handled under the per-instance lock: load or create, look
/// up the transition, save, then dispatch effects in order. A save that
/// loses an optimistic-concurrency race is re-run from the load with bounded
/// backoff. Events for different instances run in parallel.
pub struct StateMachineRuntime<M, R, D>
where
    M: StateMachine,
    R: SagaRepository,
    D: EffectDispatcher,
{
    machine: M,
    store: SagaStore<R>,
    dispatcher: D,
    retry: RetryPolicy,
}

impl<M, R, D> StateMachineRuntime<M, R, D>
where
    M: StateMachine,
    R: SagaRepository,
    D: EffectDispatcher,
{
    /// Creates a runtime whose new instances start in the machine's initial state.
    pub fn new(machine: M, repository: R, dispatcher: D) -> Self {
        let store = SagaStore::new(repository, machine.initial_state().to_string());
        Self {
            machine,
            store,
            dispatcher,
            retry: RetryPolicy::conflict(),
        }
    }

    /// Sets the retry policy for conflicting saves.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn store(&self) -> &SagaStore<R> {
        &self.store
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Returns the persisted instance, or `NotFound`.
    pub async fn instance(&self, correlation_id: CorrelationId) -> Result<SagaRecord> {
        Ok(self.store.get(correlation_id).await?)
    }

    /// Handles one event for one instance.
    ///
    /// The new state is persisted before any effect is dispatched. If a
    /// dispatch fails the error is returned with the state already saved.
    #[tracing::instrument(skip(self, event), fields(event = self.machine.event_name(event)))]
    pub async fn handle(
        &self,
        correlation_id: CorrelationId,
        event: &M::Event,
    ) -> Result<HandleOutcome<M::State>> {
        metrics::counter!("saga_events_total").increment(1);
        let started = Instant::now();

        let _guard = self.store.lock(correlation_id).await;
        let result = self.handle_locked(correlation_id, event).await;

        let label = match &result {
            Ok(HandleOutcome::Transitioned { .. }) => "transitioned",
            Ok(HandleOutcome::Ignored { .. }) => "ignored",
            Err(SagaError::InvalidTransition { .. }) => "rejected",
            Err(_) => "failed",
        };
        metrics::histogram!("saga_handle_duration_seconds", "result" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn handle_locked(
        &self,
        correlation_id: CorrelationId,
        event: &M::Event,
    ) -> Result<HandleOutcome<M::State>> {
        let (outcome, effects) = (|| async { self.apply_once(correlation_id, event).await })
            .retry(self.retry.backoff())
            .when(SagaError::is_conflict)
            .notify(|err: &SagaError, dur: Duration| {
                metrics::counter!("saga_conflict_retries_total").increment(1);
                warn!(error = %err, delay = ?dur, "Save conflicted, retrying");
            })
            .await?;

        for effect in &effects {
            self.dispatcher.dispatch(effect).await?;
        }
        Ok(outcome)
    }

    async fn apply_once(
        &self,
        correlation_id: CorrelationId,
        event: &M::Event,
    ) -> Result<(HandleOutcome<M::State>, Vec<Effect>)> {
        let mut instance = self.store.get_or_create(correlation_id).await?;
        let current: M::State =
            instance
                .current_state
                .parse()
                .map_err(|_| SagaError::CorruptState {
                    correlation_id,
                    state: instance.current_state.clone(),
                })?;

        match self.machine.transition(correlation_id, current, event) {
            Transition::Unhandled => {
                info!(state = %current, "No transition for event, ignoring");
                metrics::counter!("saga_events_ignored_total").increment(1);
                Ok((HandleOutcome::Ignored { state: current }, Vec::new()))
            }
            Transition::Disallowed => Err(SagaError::InvalidTransition {
                correlation_id,
                state: current.to_string(),
                event: self.machine.event_name(event),
            }),
            Transition::Next { state, effects } => {
                instance.current_state = state.to_string();
                self.machine.apply(&mut instance, event);
                self.store.save(&mut instance).await?;

                info!(from = %current, to = %state, "Saga transitioned");
                metrics::counter!(
                    "saga_transitions_total",
                    "from" => current.to_string(),
                    "to" => state.to_string()
                )
                .increment(1);
                Ok((
                    HandleOutcome::Transitioned {
                        from: current,
                        to: state,
                    },
                    effects,
                ))
            }
        }
    }
}
