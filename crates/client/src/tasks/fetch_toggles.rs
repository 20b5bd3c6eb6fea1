use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use togglebox_core::ChangeToken;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::LocalCache;
use crate::remote::{FetchOutcome, RemoteClient};
use crate::scheduler::{ScheduledTask, TaskError, TaskOutcome};
use crate::state::ToggleStore;

use super::FETCH_TOGGLES;

/// Polls the toggle service and publishes new sets.
///
/// Keeps the change token of the last set it saw so unchanged polls are
/// cheap. A new set is made visible first, then backed up; a failed backup
/// is logged and does not fail the poll. A backup still running when the
/// client stops is abandoned and the run reports `Cancelled`.
pub struct FetchTogglesTask {
    remote: Arc<dyn RemoteClient>,
    cache: Arc<dyn LocalCache>,
    toggles: Arc<ToggleStore>,
    change_token: Mutex<Option<ChangeToken>>,
}

impl FetchTogglesTask {
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        cache: Arc<dyn LocalCache>,
        toggles: Arc<ToggleStore>,
        change_token: Option<ChangeToken>,
    ) -> Self {
        Self {
            remote,
            cache,
            toggles,
            change_token: Mutex::new(change_token),
        }
    }

    pub fn change_token(&self) -> Option<ChangeToken> {
        self.change_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_change_token(&self, token: Option<ChangeToken>) {
        *self
            .change_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// One poll. Also used by the client for the fetch before startup.
    pub async fn fetch_once(&self, cancel: &CancellationToken) -> Result<TaskOutcome, TaskError> {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let token = self.change_token();
        match self.remote.fetch_toggles(token.as_ref(), cancel).await? {
            FetchOutcome::NotModified => {
                debug!(task = FETCH_TOGGLES, "toggle set unchanged");
                Ok(TaskOutcome::Unchanged)
            }
            FetchOutcome::Modified {
                flags,
                change_token,
            } => {
                let count = flags.len();
                self.toggles.replace(flags.clone())?;
                self.set_change_token(change_token.clone());
                info!(task = FETCH_TOGGLES, toggles = count, "toggle set updated");

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(task = FETCH_TOGGLES, "backup interrupted by shutdown");
                        return Err(TaskError::Cancelled);
                    }
                    result = self.cache.save(&flags, change_token.as_ref()) => {
                        if let Err(e) = result {
                            warn!(task = FETCH_TOGGLES, error = %e, "failed to back up toggle set");
                        }
                    }
                }
                Ok(TaskOutcome::Completed)
            }
        }
    }
}

#[async_trait]
impl ScheduledTask for FetchTogglesTask {
    fn name(&self) -> &str {
        FETCH_TOGGLES
    }

    async fn run(&self, cancel: CancellationToken) -> Result<TaskOutcome, TaskError> {
        self.fetch_once(&cancel).await
    }
}
