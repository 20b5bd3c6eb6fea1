use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use togglebox_core::ClientMetrics;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::remote::RemoteClient;
use crate::scheduler::{ScheduledTask, TaskError, TaskOutcome};
use crate::state::MetricsRecorder;

use super::SEND_METRICS;

/// Drains the evaluation counters and reports them.
///
/// A bucket that fails to send is dropped; the next report starts from the
/// drain time regardless.
pub struct SendMetricsTask {
    remote: Arc<dyn RemoteClient>,
    metrics: Arc<MetricsRecorder>,
    app_name: String,
    instance_id: String,
}

impl SendMetricsTask {
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        metrics: Arc<MetricsRecorder>,
        app_name: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            metrics,
            app_name: app_name.into(),
            instance_id: instance_id.into(),
        }
    }
}

#[async_trait]
impl ScheduledTask for SendMetricsTask {
    fn name(&self) -> &str {
        SEND_METRICS
    }

    async fn run(&self, cancel: CancellationToken) -> Result<TaskOutcome, TaskError> {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let bucket = self.metrics.drain_and_reset(Utc::now());
        if bucket.is_empty() {
            debug!(task = SEND_METRICS, "no evaluations to report");
            return Ok(TaskOutcome::Unchanged);
        }

        let toggles = bucket.toggles.len();
        let payload = ClientMetrics {
            app_name: self.app_name.clone(),
            instance_id: self.instance_id.clone(),
            bucket,
        };
        self.remote.send_metrics(&payload, &cancel).await?;
        debug!(task = SEND_METRICS, toggles, "metrics reported");
        Ok(TaskOutcome::Completed)
    }
}
