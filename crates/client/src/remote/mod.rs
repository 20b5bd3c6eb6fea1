//! Talking to the toggle service.
//!
//! [`RemoteClient`] is the seam between background tasks and the network;
//! [`HttpRemoteClient`] is the production implementation. Tests and
//! embedders may inject their own.

mod http;

use async_trait::async_trait;
use togglebox_core::{ChangeToken, ClientMetrics, ClientRegistration, FlagSet};
use tokio_util::sync::CancellationToken;

pub use self::http::HttpRemoteClient;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} responded with status {status}")]
    Status { status: u16, url: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid service URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Result of polling for toggles.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The service sent a new set.
    Modified {
        flags: FlagSet,
        change_token: Option<ChangeToken>,
    },
    /// The set behind the supplied change token is still current.
    NotModified,
}

/// Remote toggle service operations.
///
/// Every call takes the client-wide cancellation token and returns
/// [`RemoteError::Cancelled`] promptly once it fires. A failed fetch is an
/// error, never an empty set.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn fetch_toggles(
        &self,
        change_token: Option<&ChangeToken>,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, RemoteError>;

    async fn register_client(
        &self,
        registration: &ClientRegistration,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError>;

    async fn send_metrics(
        &self,
        metrics: &ClientMetrics,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError>;
}
