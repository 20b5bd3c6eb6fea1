//! Usage-metrics and registration payloads reported to the toggle service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Evaluation outcome counts for one toggle within a bucket window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleCount {
    pub yes: u64,
    pub no: u64,
}

impl ToggleCount {
    pub fn total(&self) -> u64 {
        self.yes + self.no
    }
}

/// A drained, time-windowed accumulation of evaluation counters.
///
/// Toggles that were never evaluated inside the window are absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsBucket {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub toggles: HashMap<String, ToggleCount>,
}

impl MetricsBucket {
    pub fn is_empty(&self) -> bool {
        self.toggles.is_empty()
    }

    pub fn count(&self, toggle: &str) -> Option<ToggleCount> {
        self.toggles.get(toggle).copied()
    }
}

/// Body of the metrics report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetrics {
    pub app_name: String,
    pub instance_id: String,
    pub bucket: MetricsBucket,
}

/// Body of the one-shot client registration sent at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegistration {
    pub app_name: String,
    pub instance_id: String,
    pub sdk_version: String,
    pub strategies: Vec<String>,
    pub started: DateTime<Utc>,
    /// Metrics interval in milliseconds.
    pub interval: u64,
}
