//! The client's background work, expressed as [`ScheduledTask`](crate::scheduler::ScheduledTask)s.

mod fetch_toggles;
mod register_client;
mod send_metrics;

pub use self::fetch_toggles::FetchTogglesTask;
pub use self::register_client::RegisterClientTask;
pub use self::send_metrics::SendMetricsTask;

pub const FETCH_TOGGLES: &str = "fetch-toggles";
pub const REGISTER_CLIENT: &str = "register-client";
pub const SEND_METRICS: &str = "send-metrics";
