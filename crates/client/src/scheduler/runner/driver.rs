use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::scheduler::phase::{on_complete, on_fire, TaskPhase};
use crate::scheduler::task::{ScheduledTask, TaskDescriptor, TaskError};

use super::core::Shared;

/// Drive one task until it stops: wait, run, reschedule.
pub(super) async fn drive(
    task: Arc<dyn ScheduledTask>,
    descriptor: TaskDescriptor,
    shared: Arc<Shared>,
    phase_tx: watch::Sender<TaskPhase>,
) {
    let mut phase = TaskPhase::initial(&descriptor);
    loop {
        phase_tx.send_replace(phase);
        phase = match phase {
            TaskPhase::Idle(due) | TaskPhase::Rescheduled(due) => {
                tokio::select! {
                    biased;
                    _ = shared.halt.cancelled() => TaskPhase::Stopped,
                    _ = tokio::time::sleep(due) => {
                        let halted = shared.is_halted();
                        if halted {
                            shared.with_stats(&descriptor.name, |s| s.record_skip());
                        }
                        on_fire(halted)
                    }
                }
            }
            TaskPhase::Running => {
                run_once(task.as_ref(), &descriptor, &shared).await;
                let next = on_complete(&descriptor, shared.is_halted());
                match next {
                    TaskPhase::Rescheduled(interval) => trace!(
                        task = %descriptor.name,
                        "scheduled background task to run after {:.1}s",
                        interval.as_secs_f64()
                    ),
                    _ => trace!(task = %descriptor.name, "stopped background task"),
                }
                next
            }
            TaskPhase::Stopped => break,
        };
    }
}

/// Run the task body once. Errors and panics are logged and counted, never
/// propagated.
async fn run_once(task: &dyn ScheduledTask, descriptor: &TaskDescriptor, shared: &Shared) {
    let name = descriptor.name.as_str();
    let started = Instant::now();
    let result = AssertUnwindSafe(task.run(shared.cancel.clone()))
        .catch_unwind()
        .await;
    let elapsed = started.elapsed();

    let ok = match result {
        Ok(Ok(outcome)) => {
            debug!(task = %name, ?outcome, elapsed_ms = elapsed.as_millis() as u64, "background task finished");
            true
        }
        Ok(Err(TaskError::Cancelled)) => {
            debug!(task = %name, "background task cancelled mid-run");
            false
        }
        Ok(Err(e)) => {
            warn!(task = %name, error = %e, "unhandled error from background task");
            false
        }
        Err(panic) => {
            error!(task = %name, panic = %panic_message(panic.as_ref()), "background task panicked");
            false
        }
    };

    shared.with_stats(name, |s| s.record_run(elapsed, ok));
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
