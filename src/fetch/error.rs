//! Error types for network fetch operations.
//!
//! Variants carry the URL they failed on; helper constructors supply that
//! context, which is why no contextless `From` impls exist for
//! `reqwest::Error` or `serde_json::Error`.

use thiserror::Error;

/// Errors that can occur while fetching a resource over the network.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    ///
    /// Reported identically to a network failure by callers; the timeout
    /// bound is inherited from the transport configuration.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body did not parse as the expected document.
    #[error("malformed payload from {url}: {source}")]
    Malformed {
        /// The URL whose payload failed to parse.
        url: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A partition file reference could not be resolved to a URL.
    #[error("cannot resolve partition file '{file}' against {base}")]
    InvalidUrl {
        /// The file reference from the manifest.
        file: String,
        /// The base (manifest) URL it was resolved against.
        base: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a malformed-payload error.
    pub fn malformed(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Malformed {
            url: url.into(),
            source,
        }
    }

    /// Creates an unresolvable-file error.
    pub fn invalid_url(file: impl Into<String>, base: impl Into<String>) -> Self {
        Self::InvalidUrl {
            file: file.into(),
            base: base.into(),
        }
    }
}
