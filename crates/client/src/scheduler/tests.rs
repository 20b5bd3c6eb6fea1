use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::scheduler::{
    ScheduledTask, SchedulerError, TaskError, TaskOutcome, TaskPhase, TaskScheduler,
};

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    Panic,
    /// Sleeps for the configured delay without looking at the token.
    IgnoreCancel,
}

/// Task double that records when it ran and how many runs overlapped.
struct ProbeTask {
    name: String,
    behavior: Behavior,
    delay: Duration,
    runs: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started_at: Mutex<Vec<Instant>>,
}

impl ProbeTask {
    fn new(name: &str, behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            delay,
            runs: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started_at: Mutex::new(Vec::new()),
        })
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    fn starts(&self) -> Vec<Instant> {
        self.started_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduledTask for ProbeTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: CancellationToken) -> Result<TaskOutcome, TaskError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.started_at.lock().unwrap().push(Instant::now());
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let result = match self.behavior {
            Behavior::IgnoreCancel => {
                tokio::time::sleep(self.delay).await;
                Ok(TaskOutcome::Completed)
            }
            _ => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(TaskError::Cancelled),
                    _ = tokio::time::sleep(self.delay) => Ok(TaskOutcome::Completed),
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Fail => Err(TaskError::Failed("remote unreachable".into())),
            Behavior::Panic => panic!("task body panicked"),
            _ => result,
        }
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[tokio::test(start_paused = true)]
async fn one_shot_immediate_runs_exactly_once() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    let task = ProbeTask::new("poll", Behavior::Succeed, Duration::ZERO);

    scheduler.register(task.clone(), Duration::ZERO, true).unwrap();
    tokio::time::sleep(secs(120)).await;

    assert_eq!(task.runs(), 1);
    assert_eq!(scheduler.phase("poll"), Some(TaskPhase::Stopped));
    assert_eq!(scheduler.stats("poll").unwrap().succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn reschedules_after_completion_not_at_fixed_rate() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    let task = ProbeTask::new("metrics", Behavior::Succeed, secs(40));
    let registered_at = Instant::now();

    scheduler.register(task.clone(), secs(30), false).unwrap();
    tokio::time::sleep(secs(75)).await;
    assert_eq!(task.starts().len(), 1, "second run must wait for the first to finish");

    tokio::time::sleep(secs(30)).await;
    let starts = task.starts();
    assert_eq!(starts.len(), 2);
    assert!(starts[0] - registered_at >= secs(30));
    assert!(starts[1] - starts[0] >= secs(70), "interval counts from completion");
}

#[tokio::test(start_paused = true)]
async fn runs_of_one_task_never_overlap() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    let task = ProbeTask::new("slow", Behavior::Succeed, secs(3));

    scheduler.register(task.clone(), secs(1), true).unwrap();
    tokio::time::sleep(secs(60)).await;

    assert!(task.runs() >= 10, "only {} runs", task.runs());
    assert_eq!(task.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_runs_are_rescheduled() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    let task = ProbeTask::new("flaky", Behavior::Fail, Duration::ZERO);

    scheduler.register(task.clone(), secs(5), true).unwrap();
    tokio::time::sleep(secs(21)).await;

    assert_eq!(task.runs(), 5);
    let stats = scheduler.stats("flaky").unwrap();
    assert_eq!(stats.failed, 5);
    assert_eq!(stats.succeeded, 0);
    assert!(matches!(scheduler.phase("flaky"), Some(TaskPhase::Rescheduled(_))));
}

#[tokio::test(start_paused = true)]
async fn panicking_runs_are_contained_and_rescheduled() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    let task = ProbeTask::new("explosive", Behavior::Panic, Duration::ZERO);

    scheduler.register(task.clone(), secs(5), true).unwrap();
    tokio::time::sleep(secs(11)).await;

    assert_eq!(task.runs(), 3);
    assert_eq!(scheduler.stats("explosive").unwrap().failed, 3);
    scheduler.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn duplicate_registration_keeps_the_first() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    let first = ProbeTask::new("poll", Behavior::Succeed, Duration::ZERO);
    let second = ProbeTask::new("poll", Behavior::Succeed, Duration::ZERO);

    scheduler.register(first.clone(), secs(10), true).unwrap();
    let err = scheduler.register(second.clone(), secs(1), true).unwrap_err();
    assert!(matches!(err, SchedulerError::DuplicateRegistration(ref name) if name == "poll"));

    tokio::time::sleep(secs(25)).await;
    assert_eq!(first.runs(), 3);
    assert_eq!(second.runs(), 0);
    assert_eq!(scheduler.descriptor("poll").unwrap().interval, secs(10));
}

#[tokio::test(start_paused = true)]
async fn no_run_after_dispose() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    let task = ProbeTask::new("poll", Behavior::Succeed, Duration::ZERO);

    scheduler.register(task.clone(), secs(1), true).unwrap();
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    scheduler.dispose().await.unwrap();
    let runs = task.runs();

    tokio::time::sleep(secs(60)).await;
    assert_eq!(task.runs(), runs);
    assert!(scheduler.task_names().is_empty());
    assert!(scheduler.is_disposed());
}

#[tokio::test(start_paused = true)]
async fn dispose_twice_is_a_no_op() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    scheduler
        .register(ProbeTask::new("a", Behavior::Succeed, Duration::ZERO), secs(1), true)
        .unwrap();
    scheduler
        .register(ProbeTask::new("b", Behavior::Succeed, Duration::ZERO), secs(1), false)
        .unwrap();

    let (first, second) = tokio::join!(scheduler.dispose(), scheduler.dispose());
    first.unwrap();
    second.unwrap();
    scheduler.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dispose_waits_for_in_flight_run() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    let task = ProbeTask::new("save", Behavior::IgnoreCancel, Duration::from_millis(500));

    scheduler.register(task.clone(), secs(10), true).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(scheduler.phase("save"), Some(TaskPhase::Running));

    scheduler.dispose().await.unwrap();
    assert_eq!(task.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(task.runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn stuck_task_fails_disposal_with_timeout() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    let stuck = ProbeTask::new("stuck", Behavior::IgnoreCancel, secs(30));
    let fine = ProbeTask::new("fine", Behavior::Succeed, Duration::ZERO);

    scheduler.register(stuck.clone(), secs(10), true).unwrap();
    scheduler.register(fine.clone(), secs(10), false).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let started = Instant::now();
    let err = scheduler.dispose().await.unwrap_err();
    match err {
        SchedulerError::ShutdownTimeout { task, grace } => {
            assert_eq!(task, "stuck");
            assert_eq!(grace, secs(1));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(Instant::now() - started < secs(3));

    // A later call has nothing left to stop.
    scheduler.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_turns_ticks_into_no_ops() {
    let cancel = CancellationToken::new();
    let scheduler = TaskScheduler::new(cancel.clone());
    let task = ProbeTask::new("metrics", Behavior::Succeed, Duration::ZERO);

    scheduler.register(task.clone(), secs(5), false).unwrap();
    cancel.cancel();
    tokio::time::sleep(secs(30)).await;

    assert_eq!(task.runs(), 0);
    assert_eq!(scheduler.phase("metrics"), Some(TaskPhase::Stopped));
    scheduler.dispose().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_run_skips_reschedule() {
    let cancel = CancellationToken::new();
    let scheduler = TaskScheduler::new(cancel.clone());
    let task = ProbeTask::new("poll", Behavior::IgnoreCancel, secs(2));

    scheduler.register(task.clone(), secs(1), true).unwrap();
    tokio::time::sleep(secs(1)).await;
    cancel.cancel();
    tokio::time::sleep(secs(30)).await;

    assert_eq!(task.runs(), 1);
    assert_eq!(scheduler.phase("poll"), Some(TaskPhase::Stopped));
}

#[tokio::test(start_paused = true)]
async fn register_after_dispose_is_rejected() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    scheduler.dispose().await.unwrap();

    let err = scheduler
        .register(ProbeTask::new("late", Behavior::Succeed, Duration::ZERO), secs(1), true)
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Disposed));
}

#[test]
fn register_outside_runtime_is_rejected() {
    let scheduler = TaskScheduler::new(CancellationToken::new());
    let err = scheduler
        .register(ProbeTask::new("poll", Behavior::Succeed, Duration::ZERO), secs(1), true)
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NoRuntime));
}
