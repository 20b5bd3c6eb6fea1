use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Operational counters for one scheduled task.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStats {
    /// Runs that returned `Ok`.
    pub succeeded: u64,
    /// Runs that returned `Err` or panicked.
    pub failed: u64,
    /// Timer fires skipped because the client was shutting down.
    pub skipped: u64,
    /// Average run duration across all runs.
    pub avg_duration: Duration,
    /// Completion time of the most recent run.
    pub last_completed: Option<DateTime<Utc>>,
}

impl TaskStats {
    pub fn runs(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Record a finished run.
    pub fn record_run(&mut self, duration: Duration, ok: bool) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.last_completed = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.runs();
        self.avg_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_run() {
        let mut s = TaskStats::default();
        s.record_run(Duration::from_millis(100), true);

        assert_eq!(s.succeeded, 1);
        assert!(s.last_completed.is_some());
        assert_eq!(s.avg_duration, Duration::from_millis(100));
    }

    #[test]
    fn failures_count_towards_average() {
        let mut s = TaskStats::default();
        s.record_run(Duration::from_millis(100), true);
        s.record_run(Duration::from_millis(200), false);

        assert_eq!(s.runs(), 2);
        assert_eq!(s.failed, 1);
        let avg = s.avg_duration.as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
    }
}
