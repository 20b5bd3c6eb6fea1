//! Shared state read on every evaluation and written by background tasks.
//!
//! - `toggles`: the active [`FlagSet`](togglebox_core::FlagSet), swapped wholesale
//! - `metrics`: per-toggle evaluation counters, drained into buckets

mod metrics;
mod toggles;

pub use self::metrics::MetricsRecorder;
pub use self::toggles::ToggleStore;

/// Errors raised by the shared-state containers.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The owning client was stopped; the state no longer serves reads or writes.
    #[error("shared state accessed after disposal")]
    Disposed,
}
