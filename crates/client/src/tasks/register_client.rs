use std::sync::Arc;

use async_trait::async_trait;
use togglebox_core::ClientRegistration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::remote::RemoteClient;
use crate::scheduler::{ScheduledTask, TaskError, TaskOutcome};

use super::REGISTER_CLIENT;

/// Announces this client instance to the toggle service. Scheduled once.
pub struct RegisterClientTask {
    remote: Arc<dyn RemoteClient>,
    registration: ClientRegistration,
}

impl RegisterClientTask {
    pub fn new(remote: Arc<dyn RemoteClient>, registration: ClientRegistration) -> Self {
        Self {
            remote,
            registration,
        }
    }

    pub fn registration(&self) -> &ClientRegistration {
        &self.registration
    }
}

#[async_trait]
impl ScheduledTask for RegisterClientTask {
    fn name(&self) -> &str {
        REGISTER_CLIENT
    }

    async fn run(&self, cancel: CancellationToken) -> Result<TaskOutcome, TaskError> {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        self.remote
            .register_client(&self.registration, &cancel)
            .await?;
        info!(
            task = REGISTER_CLIENT,
            app = %self.registration.app_name,
            instance = %self.registration.instance_id,
            "client registered"
        );
        Ok(TaskOutcome::Completed)
    }
}
