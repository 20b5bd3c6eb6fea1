//! Self-rescheduling background task runner.
//!
//! Each registered [`ScheduledTask`] gets its own driver on the tokio runtime.
//! A driver waits for the task's due time, runs it, then waits one interval
//! *after completion* before the next run, so a slow run delays the next one
//! instead of overlapping it. Failures are logged and the task is
//! rescheduled as usual.
//!
//! Disposal flips a stopped flag, wakes every idle driver and waits (bounded
//! by a grace period) for in-flight runs to finish.

mod phase;
mod runner;
mod stats;
mod task;

#[cfg(test)]
mod tests;

use std::time::Duration;

pub use self::phase::TaskPhase;
pub use self::runner::{TaskScheduler, DEFAULT_SHUTDOWN_GRACE};
pub use self::stats::TaskStats;
pub use self::task::{ScheduledTask, TaskDescriptor, TaskError, TaskOutcome};

/// Scheduler lifecycle errors. These are the only scheduler failures that
/// reach the caller; task failures stay inside the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("task '{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("timeout waiting for task '{task}' to stop after {grace:?}")]
    ShutdownTimeout { task: String, grace: Duration },

    #[error("scheduler has been disposed")]
    Disposed,

    #[error("no tokio runtime available to drive background tasks")]
    NoRuntime,
}
