pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod toggle;

pub use config::ClientSettings;
pub use context::EvaluationContext;
pub use error::*;
pub use metrics::*;
pub use toggle::*;
