//! Deferred, cancellable message delivery.
//!
//! [`TimerScheduler`] keeps pending jobs keyed by token and fires them from a
//! dedicated task. [`SchedulerBridge`] turns `ScheduleMessage` /
//! `CancelScheduledMessage` commands into jobs and, through its
//! [`JobExecutionAdapter`], republishes each fired payload to its destination
//! with bounded retries.

pub mod bridge;
pub mod error;
pub mod job;
pub mod messages;
pub mod publisher;
pub mod timer;

pub use bridge::{JobExecutionAdapter, SchedulerBridge};
pub use error::{PublishError, PublishFailure, Result, SchedulerError};
pub use job::{JobStatus, ScheduledJob};
pub use messages::{CancelScheduledMessage, ScheduleMessage};
pub use publisher::{ChannelPublisher, InMemoryPublisher, MessagePublisher, PublishedMessage};
pub use timer::{DEFAULT_HISTORY_CAPACITY, JobExecutor, RunState, TimerScheduler};
