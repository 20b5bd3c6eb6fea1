//! Feature toggle client runtime.
//!
//! A [`ToggleClient`] keeps a local copy of the toggle set fresh by polling
//! the toggle service in the background, evaluates toggles against it
//! without blocking, and reports evaluation counts back.
//!
//! ```no_run
//! # async fn demo() -> Result<(), togglebox_client::ClientError> {
//! use togglebox_client::{ClientSettings, ToggleClient};
//!
//! let client = ToggleClient::builder(ClientSettings::from_env()).start().await?;
//! if client.is_enabled("checkout-v2") {
//!     // ...
//! }
//! client.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod context;
pub mod error;
pub mod remote;
pub mod scheduler;
pub mod state;
pub mod strategy;
pub mod tasks;

pub use cache::{CacheError, CachedToggles, FileCache, LocalCache, MemoryCache};
pub use client::{ToggleClient, ToggleClientBuilder, SDK_VERSION};
pub use context::{ContextProvider, StaticContextProvider};
pub use error::ClientError;
pub use remote::{FetchOutcome, HttpRemoteClient, RemoteClient, RemoteError};
pub use scheduler::{
    ScheduledTask, SchedulerError, TaskError, TaskOutcome, TaskPhase, TaskScheduler, TaskStats,
};
pub use state::{MetricsRecorder, StateError, ToggleStore};
pub use strategy::{Strategy, StrategyRegistry};

pub use togglebox_core::{
    ActivationStrategy, ChangeToken, ClientSettings, EvaluationContext, FeatureToggle, FlagSet,
};
