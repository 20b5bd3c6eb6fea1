use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::PoisonError;

use tracing::{debug, info, warn};

use crate::scheduler::SchedulerError;

use super::core::{TaskScheduler, TaskSlot};

impl TaskScheduler {
    /// Stop every task and wait for in-flight runs to finish.
    ///
    /// Each driver gets the scheduler's grace period to confirm it stopped.
    /// A driver that misses it is aborted and the first such task is
    /// reported as [`SchedulerError::ShutdownTimeout`]; the remaining tasks
    /// are still stopped. Calling this again is a no-op that returns once
    /// any disposal already in progress has finished.
    pub async fn dispose(&self) -> Result<(), SchedulerError> {
        let _disposing = self.dispose_lock.lock().await;

        let slots: HashMap<String, TaskSlot> = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            self.shared.stopped.store(true, Ordering::SeqCst);
            std::mem::take(&mut *slots)
        };
        self.shared.halt.cancel();

        if slots.is_empty() {
            return Ok(());
        }

        let mut slots: Vec<(String, TaskSlot)> = slots.into_iter().collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        let names: Vec<&str> = slots.iter().map(|(name, _)| name.as_str()).collect();
        info!(tasks = ?names, "stopping background tasks");

        let mut timed_out: Option<String> = None;
        for (name, slot) in slots {
            let mut handle = slot.handle;
            match tokio::time::timeout(self.grace, &mut handle).await {
                Ok(Ok(())) => debug!(task = %name, "background task stopped"),
                Ok(Err(e)) => warn!(task = %name, error = %e, "background task driver ended abnormally"),
                Err(_) => {
                    handle.abort();
                    warn!(task = %name, grace = ?self.grace, "timeout waiting for background task to stop");
                    timed_out.get_or_insert(name);
                }
            }
        }

        match timed_out {
            Some(task) => Err(SchedulerError::ShutdownTimeout {
                task,
                grace: self.grace,
            }),
            None => Ok(()),
        }
    }
}
