use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheError;
use crate::remote::RemoteError;
use crate::state::StateError;

/// Failure of a single task run. Logged by the scheduler, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("local cache failed: {0}")]
    Cache(#[from] CacheError),

    #[error("shared state unavailable: {0}")]
    State(#[from] StateError),

    #[error("task cancelled")]
    Cancelled,

    #[error("task failed: {0}")]
    Failed(String),
}

/// What a successful run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The run did its work.
    Completed,
    /// Nothing to do this time (e.g. the remote reported no changes).
    Unchanged,
}

/// A unit of recurring background work driven by the
/// [`TaskScheduler`](super::TaskScheduler).
///
/// `run` receives the client-wide cancellation token and should check it at
/// its I/O boundaries.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    /// Unique name: the registration key and the `task` field in logs.
    fn name(&self) -> &str;

    async fn run(&self, cancel: CancellationToken) -> Result<TaskOutcome, TaskError>;
}

/// How a task is scheduled. Fixed at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub name: String,
    /// Delay between the end of one run and the start of the next.
    /// Zero means the task runs once and is never rescheduled.
    pub interval: Duration,
    /// Run as soon as registered instead of waiting one interval.
    pub run_immediately: bool,
}

impl TaskDescriptor {
    pub fn new(name: impl Into<String>, interval: Duration, run_immediately: bool) -> Self {
        Self {
            name: name.into(),
            interval,
            run_immediately,
        }
    }

    /// Delay before the first run.
    pub fn first_due(&self) -> Duration {
        if self.run_immediately {
            Duration::ZERO
        } else {
            self.interval
        }
    }

    pub fn is_one_shot(&self) -> bool {
        self.interval.is_zero()
    }
}
