use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use togglebox_core::{MetricsBucket, ToggleCount};

#[derive(Debug, Default)]
struct Counter {
    yes: AtomicU64,
    no: AtomicU64,
}

impl Counter {
    fn bump(&self, enabled: bool) {
        let slot = if enabled { &self.yes } else { &self.no };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ToggleCount {
        ToggleCount {
            yes: self.yes.load(Ordering::Relaxed),
            no: self.no.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct ActiveBucket {
    start: DateTime<Utc>,
    counters: HashMap<String, Counter>,
}

impl ActiveBucket {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            counters: HashMap::new(),
        }
    }
}

/// Accumulates evaluation outcomes until the metrics task drains them.
///
/// Increments on an already-seen toggle only take the shared lock and bump
/// an atomic. First-seen toggles and drains take the exclusive lock, so a
/// drain can never interleave with an increment and lose it.
#[derive(Debug)]
pub struct MetricsRecorder {
    active: RwLock<ActiveBucket>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            active: RwLock::new(ActiveBucket::new(start)),
        }
    }

    /// Count one evaluation of `toggle`.
    pub fn record(&self, toggle: &str, enabled: bool) {
        {
            let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(counter) = active.counters.get(toggle) {
                counter.bump(enabled);
                return;
            }
        }

        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        active
            .counters
            .entry(toggle.to_string())
            .or_default()
            .bump(enabled);
    }

    /// Capture the active bucket and start a fresh one at `bucket_start`.
    ///
    /// Toggles with no evaluations in the window are left out.
    pub fn drain_and_reset(&self, bucket_start: DateTime<Utc>) -> MetricsBucket {
        let drained = {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            mem::replace(&mut *active, ActiveBucket::new(bucket_start))
        };

        let toggles = drained
            .counters
            .iter()
            .map(|(name, counter)| (name.clone(), counter.snapshot()))
            .filter(|(_, count)| count.total() > 0)
            .collect();

        MetricsBucket {
            start: drained.start,
            stop: Utc::now(),
            toggles,
        }
    }

    /// Start of the window currently accumulating.
    pub fn bucket_start(&self) -> DateTime<Utc> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .start
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn record_concurrently(recorder: &Arc<MetricsRecorder>, toggle: &str, k: usize) {
        let threads = 8;
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let recorder = Arc::clone(recorder);
                let toggle = toggle.to_string();
                // Spread k increments over the threads.
                let share = k / threads + usize::from(t < k % threads);
                thread::spawn(move || {
                    for _ in 0..share {
                        recorder.record(&toggle, true);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn concurrent_records_are_all_counted() {
        for k in [0usize, 1, 1000] {
            let recorder = Arc::new(MetricsRecorder::new());
            record_concurrently(&recorder, "checkout", k);

            let bucket = recorder.drain_and_reset(Utc::now());
            let counted = bucket.count("checkout").map(|c| c.yes).unwrap_or(0);
            assert_eq!(counted as usize, k, "k = {k}");
        }
    }

    #[test]
    fn zero_count_toggles_are_omitted() {
        let recorder = MetricsRecorder::new();
        recorder.record("seen", false);

        let bucket = recorder.drain_and_reset(Utc::now());
        assert_eq!(bucket.count("seen"), Some(ToggleCount { yes: 0, no: 1 }));
        assert!(bucket.count("never").is_none());

        let empty = recorder.drain_and_reset(Utc::now());
        assert!(empty.is_empty());
    }

    #[test]
    fn drain_resets_window_and_counters() {
        let first_start = Utc::now();
        let recorder = MetricsRecorder::starting_at(first_start);
        recorder.record("a", true);
        recorder.record("a", false);

        let second_start = Utc::now();
        let bucket = recorder.drain_and_reset(second_start);
        assert_eq!(bucket.start, first_start);
        assert!(bucket.stop >= first_start);
        assert_eq!(bucket.count("a"), Some(ToggleCount { yes: 1, no: 1 }));
        assert_eq!(recorder.bucket_start(), second_start);

        recorder.record("a", true);
        let next = recorder.drain_and_reset(Utc::now());
        assert_eq!(next.count("a"), Some(ToggleCount { yes: 1, no: 0 }));
    }

    #[test]
    fn drains_racing_with_records_lose_nothing() {
        let recorder = Arc::new(MetricsRecorder::new());
        let per_thread = 5_000;
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let recorder = Arc::clone(&recorder);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        recorder.record(if i % 2 == 0 { "even" } else { "odd" }, true);
                    }
                })
            })
            .collect();

        let mut total = 0u64;
        while writers.iter().any(|w| !w.is_finished()) {
            let bucket = recorder.drain_and_reset(Utc::now());
            total += bucket.toggles.values().map(ToggleCount::total).sum::<u64>();
        }
        for writer in writers {
            writer.join().unwrap();
        }
        let bucket = recorder.drain_and_reset(Utc::now());
        total += bucket.toggles.values().map(ToggleCount::total).sum::<u64>();

        assert_eq!(total, 4 * per_thread as u64);
    }
}
