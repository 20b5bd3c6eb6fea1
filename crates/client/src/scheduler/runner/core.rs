use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::scheduler::phase::TaskPhase;
use crate::scheduler::stats::TaskStats;
use crate::scheduler::task::{ScheduledTask, TaskDescriptor};
use crate::scheduler::SchedulerError;

use super::driver::drive;

/// How long disposal waits for each task's in-flight run.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// State shared between the scheduler handle and its drivers.
pub(super) struct Shared {
    /// Client-wide cancellation, handed to every task run.
    pub(super) cancel: CancellationToken,
    /// Child of `cancel`; also cancelled by disposal to wake idle drivers.
    pub(super) halt: CancellationToken,
    /// Set once disposal starts. Checked by every tick before doing work.
    pub(super) stopped: AtomicBool,
    pub(super) stats: RwLock<HashMap<String, TaskStats>>,
}

impl Shared {
    pub(super) fn is_halted(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.halt.is_cancelled()
    }

    pub(super) fn with_stats(&self, task: &str, f: impl FnOnce(&mut TaskStats)) {
        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        f(stats.entry(task.to_string()).or_default());
    }
}

/// One registered task: its descriptor, its driver, and the driver's phase.
pub(super) struct TaskSlot {
    pub(super) descriptor: TaskDescriptor,
    pub(super) handle: JoinHandle<()>,
    pub(super) phase: watch::Receiver<TaskPhase>,
}

/// Runs a fixed set of named background tasks, one driver per task.
///
/// Within a task runs are strictly serialized; different tasks run
/// concurrently with no ordering between them.
pub struct TaskScheduler {
    pub(super) shared: Arc<Shared>,
    /// Live drivers by task name. Emptied by disposal.
    pub(super) slots: Mutex<HashMap<String, TaskSlot>>,
    pub(super) grace: Duration,
    /// Serializes disposal so a second caller returns only after the first
    /// has confirmed every driver stopped.
    pub(super) dispose_lock: tokio::sync::Mutex<()>,
}

impl TaskScheduler {
    /// Create a scheduler whose tasks observe `cancel`.
    pub fn new(cancel: CancellationToken) -> Self {
        Self::with_grace(cancel, DEFAULT_SHUTDOWN_GRACE)
    }

    /// Create a scheduler with a custom per-task shutdown grace period.
    pub fn with_grace(cancel: CancellationToken, grace: Duration) -> Self {
        let halt = cancel.child_token();
        Self {
            shared: Arc::new(Shared {
                cancel,
                halt,
                stopped: AtomicBool::new(false),
                stats: RwLock::new(HashMap::new()),
            }),
            slots: Mutex::new(HashMap::new()),
            grace,
            dispose_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Schedule `task` under its own name.
    ///
    /// The first run happens immediately when `run_immediately` is set,
    /// otherwise after `interval`. A zero `interval` runs the task once.
    /// Must be called from within a tokio runtime.
    pub fn register(
        &self,
        task: Arc<dyn ScheduledTask>,
        interval: Duration,
        run_immediately: bool,
    ) -> Result<(), SchedulerError> {
        let descriptor = TaskDescriptor::new(task.name(), interval, run_immediately);
        self.register_with(task, descriptor)
    }

    /// Schedule `task` with an explicit descriptor.
    pub fn register_with(
        &self,
        task: Arc<dyn ScheduledTask>,
        descriptor: TaskDescriptor,
    ) -> Result<(), SchedulerError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Checked under the slot lock: disposal sets the flag under the same lock.
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(SchedulerError::Disposed);
        }
        if slots.contains_key(&descriptor.name) {
            return Err(SchedulerError::DuplicateRegistration(descriptor.name));
        }

        let (phase_tx, phase_rx) = watch::channel(TaskPhase::initial(&descriptor));
        self.shared.with_stats(&descriptor.name, |_| {});
        let handle = runtime.spawn(drive(
            task,
            descriptor.clone(),
            Arc::clone(&self.shared),
            phase_tx,
        ));

        info!(
            task = %descriptor.name,
            interval_secs = descriptor.interval.as_secs_f64(),
            run_immediately = descriptor.run_immediately,
            "registered background task"
        );
        slots.insert(
            descriptor.name.clone(),
            TaskSlot {
                descriptor,
                handle,
                phase: phase_rx,
            },
        );
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock_slots().contains_key(name)
    }

    /// Names of all live tasks, sorted.
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_slots().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn descriptor(&self, name: &str) -> Option<TaskDescriptor> {
        self.lock_slots().get(name).map(|slot| slot.descriptor.clone())
    }

    /// Current phase of a live task's driver.
    pub fn phase(&self, name: &str) -> Option<TaskPhase> {
        self.lock_slots().get(name).map(|slot| *slot.phase.borrow())
    }

    /// Subscribe to phase changes of a live task.
    pub fn watch_phase(&self, name: &str) -> Option<watch::Receiver<TaskPhase>> {
        self.lock_slots().get(name).map(|slot| slot.phase.clone())
    }

    /// Counters for one task. Kept after disposal.
    pub fn stats(&self, name: &str) -> Option<TaskStats> {
        self.shared
            .stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn stats_snapshot(&self) -> HashMap<String, TaskStats> {
        self.shared
            .stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.grace
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, TaskSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        // Idle drivers exit; in-flight runs finish on their own.
        self.shared.halt.cancel();
    }
}
