use std::future::Future;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use serde::Serialize;
use togglebox_core::{ChangeToken, ClientMetrics, ClientRegistration, ClientSettings, FlagSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::{FetchOutcome, RemoteClient, RemoteError};

const APP_NAME_HEADER: &str = "x-togglebox-app-name";
const INSTANCE_ID_HEADER: &str = "x-togglebox-instance-id";

/// JSON-over-HTTP client for the toggle service API.
///
/// Endpoints are resolved against the configured base URL:
/// `client/features` (GET, conditional on `If-None-Match`),
/// `client/register` and `client/metrics` (POST).
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    features_url: Url,
    register_url: Url,
    metrics_url: Url,
    /// Shared HTTP client (connection pooling, identity headers, timeout).
    client: reqwest::Client,
}

impl HttpRemoteClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, RemoteError> {
        let mut base = Url::parse(&settings.api_url)?;
        // Without the trailing slash `join` would replace the last segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .default_headers(identity_headers(settings)?)
            .build()?;

        Ok(Self {
            features_url: base.join("client/features")?,
            register_url: base.join("client/register")?,
            metrics_url: base.join("client/metrics")?,
            client,
        })
    }

    pub fn features_url(&self) -> &Url {
        &self.features_url
    }

    async fn post_json<T: Serialize + Sync>(
        &self,
        url: &Url,
        body: &T,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        let response = cancellable(cancel, self.client.post(url.clone()).json(body).send()).await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, %status, "toggle service rejected request");
            return Err(RemoteError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn fetch_toggles(
        &self,
        change_token: Option<&ChangeToken>,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, RemoteError> {
        let mut request = self.client.get(self.features_url.clone());
        if let Some(token) = change_token {
            let value = HeaderValue::from_str(token.as_str())
                .map_err(|e| RemoteError::InvalidHeader(format!("{IF_NONE_MATCH}: {e}")))?;
            request = request.header(IF_NONE_MATCH, value);
        }

        let response = cancellable(cancel, request.send()).await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!(url = %self.features_url, "toggles not modified");
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                url: self.features_url.to_string(),
            });
        }

        let change_token = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(ChangeToken::new);
        let body = cancellable(cancel, response.bytes()).await?;
        let flags: FlagSet = serde_json::from_slice(&body)?;

        debug!(
            url = %self.features_url,
            toggles = flags.len(),
            etag = change_token.as_ref().map(ChangeToken::as_str).unwrap_or(""),
            "fetched toggles"
        );
        Ok(FetchOutcome::Modified {
            flags,
            change_token,
        })
    }

    async fn register_client(
        &self,
        registration: &ClientRegistration,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.post_json(&self.register_url, registration, cancel).await
    }

    async fn send_metrics(
        &self,
        metrics: &ClientMetrics,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.post_json(&self.metrics_url, metrics, cancel).await
    }
}

/// Headers sent with every request: app identity, auth, custom extras.
fn identity_headers(settings: &ClientSettings) -> Result<HeaderMap, RemoteError> {
    let mut headers = HeaderMap::new();
    headers.insert(APP_NAME_HEADER, header_value(APP_NAME_HEADER, &settings.app_name)?);
    headers.insert(
        INSTANCE_ID_HEADER,
        header_value(INSTANCE_ID_HEADER, &settings.instance_tag)?,
    );
    if let Some(token) = &settings.api_token {
        let mut value = header_value("authorization", token)?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    for (name, value) in &settings.custom_headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RemoteError::InvalidHeader(format!("{name}: {e}")))?;
        headers.insert(header, header_value(name, value)?);
    }
    Ok(headers)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, RemoteError> {
    HeaderValue::from_str(value).map_err(|e| RemoteError::InvalidHeader(format!("{name}: {e}")))
}

/// Race a request against the client-wide token.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, reqwest::Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RemoteError::Cancelled),
        result = fut => result.map_err(RemoteError::from),
    }
}
