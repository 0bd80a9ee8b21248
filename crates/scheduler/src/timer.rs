//! In-process timer scheduler.
//!
//! Jobs are kept in a token-keyed map and fired by a single worker task that
//! sleeps until the earliest trigger time or until a command wakes it. Each
//! due job is removed from the pending set and marked [`JobStatus::Fired`]
//! before its executor runs, so a job fires at most once and a late cancel
//! is a no-op. Only the most recent fired or cancelled statuses are kept for
//! lookup; older ones are evicted first in, first out.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SchedulerError};
use crate::job::{JobStatus, ScheduledJob};

/// Upper bound on how long the worker sleeps with nothing due.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Default number of fired or cancelled job statuses retained for lookup.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

/// Runs a fired job.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: ScheduledJob);
}

/// Scheduler lifecycle.
///
/// ```text
/// Created ──► Running ◄──► Standby
///                │            │
///                └──► Stopped ◄┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Running,
    /// Accepts commands but fires nothing.
    Standby,
    Stopped,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Created => "Created",
            RunState::Running => "Running",
            RunState::Standby => "Standby",
            RunState::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bounded record of terminal job statuses, oldest evicted first.
struct JobHistory {
    capacity: usize,
    statuses: HashMap<String, JobStatus>,
    order: VecDeque<String>,
}

impl JobHistory {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            statuses: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn record(&mut self, token: String, status: JobStatus) {
        if self.capacity == 0 {
            return;
        }
        if self.statuses.insert(token.clone(), status).is_none() {
            self.order.push_back(token);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.statuses.remove(&oldest);
            }
        }
    }

    fn forget(&mut self, token: &str) {
        if self.statuses.remove(token).is_some() {
            self.order.retain(|t| t != token);
        }
    }

    fn get(&self, token: &str) -> Option<JobStatus> {
        self.statuses.get(token).copied()
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

struct SchedulerState {
    run_state: RunState,
    pending: HashMap<String, ScheduledJob>,
    finished: JobHistory,
    executor: Option<Arc<dyn JobExecutor>>,
    worker: Option<JoinHandle<()>>,
}

impl SchedulerState {
    /// Removes and returns every job due at `now`, plus the next trigger time.
    fn take_due(&mut self, now: DateTime<Utc>) -> (Vec<ScheduledJob>, Option<DateTime<Utc>>) {
        let due_tokens: Vec<String> = self
            .pending
            .values()
            .filter(|job| job.is_due(now))
            .map(|job| job.token.clone())
            .collect();

        let mut due: Vec<ScheduledJob> = due_tokens
            .into_iter()
            .filter_map(|token| self.pending.remove(&token))
            .collect();
        due.sort_by_key(|job| job.trigger_time);

        for job in &due {
            self.finished.record(job.token.clone(), JobStatus::Fired);
        }

        let next = self.pending.values().map(|job| job.trigger_time).min();
        (due, next)
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.run_state == RunState::Stopped {
            return Err(SchedulerError::Unavailable(
                "scheduler has been shut down".to_string(),
            ));
        }
        Ok(())
    }
}

struct Inner {
    state: Mutex<SchedulerState>,
    wake: Notify,
}

/// Token-keyed scheduler that fires jobs at their trigger time.
///
/// Cloning shares the same scheduler.
#[derive(Clone)]
pub struct TimerScheduler {
    inner: Arc<Inner>,
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates a scheduler that remembers at most `capacity` fired or
    /// cancelled job statuses.
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState {
                    run_state: RunState::Created,
                    pending: HashMap::new(),
                    finished: JobHistory::new(capacity),
                    executor: None,
                    worker: None,
                }),
                wake: Notify::new(),
            }),
        }
    }

    /// Starts firing jobs through `executor`, or resumes from standby.
    ///
    /// Jobs that came due while created or in standby fire immediately.
    pub async fn start(&self, executor: Arc<dyn JobExecutor>) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        state.ensure_accepting()?;

        state.executor = Some(executor);
        state.run_state = RunState::Running;
        if state.worker.is_none() {
            let inner = self.inner.clone();
            state.worker = Some(tokio::spawn(run_worker(inner)));
        }
        drop(state);

        info!("Timer scheduler running");
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Stops firing while still accepting schedule and cancel commands.
    pub async fn standby(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        state.ensure_accepting()?;
        state.run_state = RunState::Standby;
        drop(state);

        info!("Timer scheduler in standby");
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Stops the scheduler and waits for in-flight executions to finish.
    ///
    /// Pending jobs are dropped. Idempotent.
    pub async fn shutdown(&self) {
        let worker = {
            let mut state = self.inner.state.lock().await;
            if state.run_state == RunState::Stopped {
                return;
            }
            state.run_state = RunState::Stopped;
            let dropped = state.pending.len();
            if dropped > 0 {
                warn!(dropped, "Shutting down with pending jobs");
            }
            state.pending.clear();
            state.executor = None;
            state.worker.take()
        };

        self.inner.wake.notify_one();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            error!(error = %e, "Timer worker terminated abnormally");
        }
        info!("Timer scheduler stopped");
    }

    /// Adds a job, replacing any pending job with the same token.
    ///
    /// Returns true if a pending job was replaced.
    pub async fn schedule(&self, job: ScheduledJob) -> Result<bool> {
        let mut state = self.inner.state.lock().await;
        state.ensure_accepting()?;

        let token = job.token.clone();
        let trigger_time = job.trigger_time;
        state.finished.forget(&token);
        let replaced = state.pending.insert(token.clone(), job).is_some();
        drop(state);

        debug!(%token, %trigger_time, replaced, "Job scheduled");
        metrics::counter!("scheduler_jobs_scheduled_total").increment(1);
        self.inner.wake.notify_one();
        Ok(replaced)
    }

    /// Removes the pending job for `token`.
    ///
    /// Returns false if no such job is pending, including when it has
    /// already fired.
    pub async fn cancel(&self, token: &str) -> Result<bool> {
        let mut state = self.inner.state.lock().await;
        state.ensure_accepting()?;

        if state.pending.remove(token).is_none() {
            debug!(%token, "Cancel ignored, no pending job");
            return Ok(false);
        }
        state
            .finished
            .record(token.to_string(), JobStatus::Cancelled);
        drop(state);

        debug!(%token, "Job cancelled");
        metrics::counter!("scheduler_jobs_cancelled_total").increment(1);
        self.inner.wake.notify_one();
        Ok(true)
    }

    /// Returns the last known status of the job for `token`.
    ///
    /// `None` for unknown tokens and for finished jobs evicted from the
    /// bounded history.
    pub async fn status(&self, token: &str) -> Option<JobStatus> {
        let state = self.inner.state.lock().await;
        if state.pending.contains_key(token) {
            return Some(JobStatus::Pending);
        }
        state.finished.get(token)
    }

    /// Number of fired or cancelled statuses currently retained.
    pub async fn history_len(&self) -> usize {
        self.inner.state.lock().await.finished.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    pub async fn run_state(&self) -> RunState {
        self.inner.state.lock().await.run_state
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_worker(inner: Arc<Inner>) {
    let mut in_flight = JoinSet::new();

    loop {
        let (due, executor, next) = {
            let mut state = inner.state.lock().await;
            match (state.run_state, state.executor.clone()) {
                (RunState::Stopped, _) => break,
                (RunState::Running, Some(executor)) => {
                    let (due, next) = state.take_due(Utc::now());
                    (due, Some(executor), next)
                }
                _ => (Vec::new(), None, None),
            }
        };

        if let Some(executor) = executor {
            for job in due {
                debug!(token = %job.token, destination = %job.destination, "Firing job");
                metrics::counter!("scheduler_jobs_fired_total").increment(1);
                let executor = executor.clone();
                in_flight.spawn(async move { executor.execute(job).await });
            }
        }

        while let Some(joined) = in_flight.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Job execution panicked");
            }
        }

        let wait = next
            .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(IDLE_WAIT);

        tokio::select! {
            _ = inner.wake.notified() => {}
            _ = tokio::time::sleep(wait) => {}
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Job execution panicked");
        }
    }
}
