//! HTTP transport boundary.
//!
//! [`Transport`] is the single seam between the core and the network; tests
//! substitute their own implementations, production uses [`HttpTransport`]
//! over a pooled reqwest client. Timeouts live here - every caller inherits
//! them and treats an elapsed timeout exactly like a network failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::LAST_MODIFIED;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use url::Url;

use super::error::FetchError;

/// Connect timeout for upstream requests.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Total request timeout. Partition files are small JSON documents; anything
/// slower than this is indistinguishable from an outage.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A fetched resource: body bytes plus upstream modification metadata.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Response body.
    pub body: Vec<u8>,
    /// Parsed `Last-Modified` header, when the upstream sent one.
    pub last_modified: Option<OffsetDateTime>,
}

/// Network boundary for resource retrieval.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `url`, returning the body on any 2xx response.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`], [`FetchError::Timeout`] or
    /// [`FetchError::HttpStatus`].
    async fn get(&self, url: &Url) -> Result<TransportResponse, FetchError>;
}

/// Production transport over a pooled reqwest client.
///
/// Create once and share; the client reuses connections across requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Creates a transport with default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self), fields(url = %url))]
    async fn get(&self, url: &Url) -> Result<TransportResponse, FetchError> {
        let response = self.client.get(url.clone()).send().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::timeout(url.as_str())
            } else {
                FetchError::network(url.as_str(), err)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url.as_str(), status.as_u16()));
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| httpdate::parse_http_date(value).ok())
            .map(OffsetDateTime::from);

        let body = response.bytes().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::timeout(url.as_str())
            } else {
                FetchError::network(url.as_str(), err)
            }
        })?;

        debug!(bytes = body.len(), "fetched resource");

        Ok(TransportResponse {
            body: body.to_vec(),
            last_modified,
        })
    }
}
