use std::sync::Arc;

use arc_swap::ArcSwapOption;
use togglebox_core::FlagSet;
use tracing::debug;

use super::StateError;

/// Holds the currently active toggle set.
///
/// Readers get an `Arc<FlagSet>` snapshot without taking a lock; a writer
/// replaces the whole set in one pointer swap, so a reader sees either the
/// old set or the new one, never a mix. After [`dispose`](Self::dispose)
/// every access fails with [`StateError::Disposed`].
pub struct ToggleStore {
    current: ArcSwapOption<FlagSet>,
}

impl ToggleStore {
    pub fn new(initial: FlagSet) -> Self {
        Self {
            current: ArcSwapOption::from_pointee(initial),
        }
    }

    /// Snapshot of the most recently committed set.
    pub fn current(&self) -> Result<Arc<FlagSet>, StateError> {
        self.current.load_full().ok_or(StateError::Disposed)
    }

    /// Atomically make `flags` the visible set.
    pub fn replace(&self, flags: FlagSet) -> Result<(), StateError> {
        let next = Arc::new(flags);
        // Never resurrect a disposed store.
        let previous = self
            .current
            .rcu(|current| current.as_ref().map(|_| Arc::clone(&next)));
        match previous {
            Some(previous) => {
                debug!(
                    previous = previous.len(),
                    current = next.len(),
                    "toggle set replaced"
                );
                Ok(())
            }
            None => Err(StateError::Disposed),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.current.load().is_none()
    }

    /// Drop the held set. Safe to call more than once.
    pub fn dispose(&self) {
        if self.current.swap(None).is_some() {
            debug!("toggle store disposed");
        }
    }
}

impl Default for ToggleStore {
    fn default() -> Self {
        Self::new(FlagSet::default())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use togglebox_core::FeatureToggle;

    use super::*;

    fn set_with(names: &[&str]) -> FlagSet {
        FlagSet::new(names.iter().map(|n| FeatureToggle::new(*n, true)))
    }

    #[test]
    fn current_returns_seed_before_any_replace() {
        let store = ToggleStore::new(set_with(&["seed"]));
        assert!(store.current().unwrap().contains("seed"));
    }

    #[test]
    fn replace_is_visible_to_next_read() {
        let store = ToggleStore::default();
        store.replace(set_with(&["a", "b"])).unwrap();

        let snapshot = store.current().unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn snapshot_survives_replacement() {
        let store = ToggleStore::new(set_with(&["old"]));
        let before = store.current().unwrap();

        store.replace(set_with(&["new"])).unwrap();

        assert!(before.contains("old"));
        assert!(store.current().unwrap().contains("new"));
    }

    #[test]
    fn access_after_dispose_fails() {
        let store = ToggleStore::default();
        store.dispose();
        store.dispose();

        assert!(store.is_disposed());
        assert!(matches!(store.current(), Err(StateError::Disposed)));
        assert!(matches!(store.replace(FlagSet::default()), Err(StateError::Disposed)));
    }

    #[test]
    fn concurrent_readers_never_observe_a_torn_set() {
        // Every published set has exactly `n` toggles named 0..n for one n.
        fn set_of_size(n: usize) -> FlagSet {
            FlagSet::new((0..n).map(|i| FeatureToggle::new(format!("{n}-{i}"), true)))
        }

        let store = Arc::new(ToggleStore::new(set_of_size(1)));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut last_seen = 1;
                    for _ in 0..2_000 {
                        let snapshot = store.current().unwrap();
                        let n = snapshot.len();
                        assert!(snapshot.names().all(|name| name.starts_with(&format!("{n}-"))));
                        assert!(n >= last_seen, "went back from {last_seen} to {n}");
                        last_seen = n;
                    }
                })
            })
            .collect();

        for n in 2..=50 {
            store.replace(set_of_size(n)).unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.current().unwrap().len(), 50);
    }
}
