//! Bridge between scheduling commands and the timer scheduler.
//!
//! `ScheduleMessage` and `CancelScheduledMessage` become job upserts and
//! removals. When a job fires, the [`JobExecutionAdapter`] republishes its
//! payload to the job's destination, retrying transient publish failures
//! with exponential backoff. A publish that exhausts its retries is logged,
//! counted, and broadcast to [`SchedulerBridge::subscribe_failures`]
//! listeners; the job stays fired.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use chrono::Utc;
use common::RetryPolicy;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{PublishError, PublishFailure, Result};
use crate::job::{JobStatus, ScheduledJob};
use crate::messages::{CancelScheduledMessage, ScheduleMessage};
use crate::publisher::MessagePublisher;
use crate::timer::{JobExecutor, TimerScheduler};

const FAILURE_CHANNEL_CAPACITY: usize = 64;

struct Republisher {
    publisher: Arc<dyn MessagePublisher>,
    policy: RetryPolicy,
    failures: broadcast::Sender<PublishFailure>,
}

impl Republisher {
    #[tracing::instrument(skip(self, job), fields(token = %job.token, destination = %job.destination))]
    async fn publish(&self, job: &ScheduledJob) -> std::result::Result<(), PublishFailure> {
        let attempts = AtomicUsize::new(0);

        let result = (|| async {
            attempts.fetch_add(1, Ordering::Relaxed);
            self.publisher.publish(&job.destination, &job.payload).await
        })
        .retry(self.policy.backoff())
        .when(PublishError::is_transient)
        .notify(|err: &PublishError, dur: Duration| {
            warn!(error = %err, delay = ?dur, "Publish failed, retrying");
        })
        .await;

        match result {
            Ok(()) => {
                debug!("Fired job published");
                metrics::counter!("scheduler_jobs_published_total").increment(1);
                Ok(())
            }
            Err(reason) => {
                let failure = PublishFailure {
                    token: job.token.clone(),
                    destination: job.destination.clone(),
                    attempts: attempts.load(Ordering::Relaxed),
                    reason,
                    failed_at: Utc::now(),
                };
                error!(
                    attempts = failure.attempts,
                    error = %failure.reason,
                    "Giving up on fired job"
                );
                metrics::counter!("scheduler_publish_failures_total").increment(1);
                // No subscribers is fine; the log line above is the record.
                let _ = self.failures.send(failure.clone());
                Err(failure)
            }
        }
    }
}

/// Runs fired jobs by republishing their payloads.
pub struct JobExecutionAdapter {
    republisher: Arc<Republisher>,
}

#[async_trait]
impl JobExecutor for JobExecutionAdapter {
    async fn execute(&self, job: ScheduledJob) {
        // Failures are already reported by the republisher.
        let _ = self.republisher.publish(&job).await;
    }
}

/// Accepts scheduling commands and owns the republish path for fired jobs.
#[derive(Clone)]
pub struct SchedulerBridge {
    scheduler: TimerScheduler,
    republisher: Arc<Republisher>,
}

impl SchedulerBridge {
    pub fn new(
        scheduler: TimerScheduler,
        publisher: Arc<dyn MessagePublisher>,
        policy: RetryPolicy,
    ) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            scheduler,
            republisher: Arc::new(Republisher {
                publisher,
                policy,
                failures,
            }),
        }
    }

    pub fn scheduler(&self) -> &TimerScheduler {
        &self.scheduler
    }

    /// Executor to hand to [`TimerScheduler::start`].
    pub fn job_executor(&self) -> Arc<dyn JobExecutor> {
        Arc::new(JobExecutionAdapter {
            republisher: self.republisher.clone(),
        })
    }

    /// Starts the scheduler with this bridge's executor.
    pub async fn start(&self) -> Result<()> {
        self.scheduler.start(self.job_executor()).await
    }

    /// Upserts a job keyed by the message token.
    #[tracing::instrument(skip(self, msg), fields(token = %msg.token, destination = %msg.destination))]
    pub async fn schedule_message(&self, msg: ScheduleMessage) -> Result<()> {
        let delivery_time = msg.delivery_time;
        let replaced = self.scheduler.schedule(ScheduledJob::from(msg)).await?;
        if replaced {
            info!(%delivery_time, "Rescheduled pending job");
        } else {
            info!(%delivery_time, "Scheduled job");
        }
        Ok(())
    }

    /// Removes the pending job for the token; unknown or fired tokens are ignored.
    #[tracing::instrument(skip(self, msg), fields(token = %msg.token))]
    pub async fn cancel_scheduled_message(&self, msg: CancelScheduledMessage) -> Result<()> {
        if self.scheduler.cancel(&msg.token).await? {
            info!("Cancelled scheduled job");
        }
        Ok(())
    }

    /// Republishes a job's payload to its destination with retries.
    pub async fn publish(&self, job: &ScheduledJob) -> std::result::Result<(), PublishFailure> {
        self.republisher.publish(job).await
    }

    pub async fn status(&self, token: &str) -> Option<JobStatus> {
        self.scheduler.status(token).await
    }

    /// Receives a report for every fired job whose publish gave up.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<PublishFailure> {
        self.republisher.failures.subscribe()
    }
}
