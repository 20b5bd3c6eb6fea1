//! Per-task driver state machine.
//!
//! ```text
//! Idle(first_due) ──fire──▶ Running ──done──▶ Rescheduled(interval) ──fire──▶ Running ...
//!        │                     │
//!        └──stop/cancel──▶ Stopped ◀──done (one-shot or cancelled)
//! ```

use std::time::Duration;

use super::task::TaskDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Registered, waiting for the first run.
    Idle(Duration),
    /// The task body is executing.
    Running,
    /// Waiting `interval` after the previous run completed.
    Rescheduled(Duration),
    /// Will never run again.
    Stopped,
}

impl TaskPhase {
    pub fn initial(descriptor: &TaskDescriptor) -> Self {
        TaskPhase::Idle(descriptor.first_due())
    }

    /// Delay until the next run, for the two waiting phases.
    pub fn due_in(&self) -> Option<Duration> {
        match self {
            TaskPhase::Idle(due) | TaskPhase::Rescheduled(due) => Some(*due),
            TaskPhase::Running | TaskPhase::Stopped => None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TaskPhase::Stopped)
    }
}

/// Phase after a timer fires: run unless the client is shutting down.
pub(crate) fn on_fire(halted: bool) -> TaskPhase {
    if halted {
        TaskPhase::Stopped
    } else {
        TaskPhase::Running
    }
}

/// Phase after a run completes, successful or not.
pub(crate) fn on_complete(descriptor: &TaskDescriptor, halted: bool) -> TaskPhase {
    if halted || descriptor.is_one_shot() {
        TaskPhase::Stopped
    } else {
        TaskPhase::Rescheduled(descriptor.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_task_starts_with_zero_delay() {
        let d = TaskDescriptor::new("poll", Duration::from_secs(30), true);
        assert_eq!(TaskPhase::initial(&d), TaskPhase::Idle(Duration::ZERO));
    }

    #[test]
    fn delayed_task_waits_one_interval() {
        let d = TaskDescriptor::new("metrics", Duration::from_secs(30), false);
        assert_eq!(TaskPhase::initial(&d).due_in(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn one_shot_stops_after_completion() {
        let d = TaskDescriptor::new("register", Duration::ZERO, true);
        assert_eq!(on_complete(&d, false), TaskPhase::Stopped);
    }

    #[test]
    fn recurring_task_reschedules_after_completion() {
        let d = TaskDescriptor::new("poll", Duration::from_secs(5), true);
        assert_eq!(on_complete(&d, false), TaskPhase::Rescheduled(Duration::from_secs(5)));
        assert_eq!(on_complete(&d, true), TaskPhase::Stopped);
    }

    #[test]
    fn halted_fire_is_a_no_op() {
        assert_eq!(on_fire(true), TaskPhase::Stopped);
        assert_eq!(on_fire(false), TaskPhase::Running);
    }
}
