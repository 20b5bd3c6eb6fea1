use togglebox_core::ToggleError;

use crate::remote::RemoteError;
use crate::scheduler::SchedulerError;
use crate::state::StateError;

/// Errors surfaced by [`ToggleClient`](crate::ToggleClient) lifecycle calls.
///
/// Background task failures never show up here; they are logged and retried
/// on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("remote client setup failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("invalid settings: {0}")]
    Config(#[from] ToggleError),

    #[error(transparent)]
    State(#[from] StateError),
}
