//! Fetch Primitive Module
//!
//! Request failure taxonomy and the reqwest-backed fetch primitive used when
//! the host does not supply its own.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::network::RetryConfig;

// == Fetch Error ==
/// Failure of a single fetch attempt, or the terminal failure of a retried one.
///
/// `Clone` so that a shared in-flight fetch can hand the same failure to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport failure (connection refused, reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its deadline
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// Host reports no connectivity
    #[error("Host is offline")]
    Offline,

    /// Caller or runtime cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Malformed request or undecodable response
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Retries ran out; carries the last attempt's failure
    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },
}

/// Classification of a failure, the input of the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Http(u16),
    Network,
    Timeout,
    Offline,
    Cancelled,
    /// Programming or type errors; never retried
    Programming,
}

impl FetchError {
    /// Returns the retry-relevant classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Http { status, .. } => ErrorKind::Http(*status),
            FetchError::Network(_) => ErrorKind::Network,
            FetchError::Timeout(_) => ErrorKind::Timeout,
            FetchError::Offline => ErrorKind::Offline,
            FetchError::Cancelled => ErrorKind::Cancelled,
            FetchError::Invalid(_) => ErrorKind::Programming,
            FetchError::RetriesExhausted { last, .. } => last.kind(),
        }
    }

    /// Convenience constructor for status failures.
    pub fn http(status: u16) -> Self {
        FetchError::Http {
            status,
            message: format!("status {}", status),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(0)
        } else if let Some(status) = e.status() {
            FetchError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_builder() {
            FetchError::Invalid(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

// == Request Context ==
/// HTTP verb recorded in request metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(verb)
    }
}

/// Describes one logical request handed to the retrying executor.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub url: String,
    pub method: HttpMethod,
    /// Overrides the retry policy derived from network quality
    pub retry: Option<RetryConfig>,
}

impl RequestContext {
    /// Creates a context for the given verb and URL.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            retry: None,
        }
    }

    /// Creates a GET context.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Pins the retry policy for this request.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

// == Asset Source ==
/// Raw bytes returned by an asset fetch.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Fetch primitive used by the binary asset cache.
///
/// Dyn-compatible so hosts can plug in their own transport.
pub trait AssetSource: Send + Sync {
    /// Fetches the asset at `url`. One call is one attempt; retries are the
    /// executor's concern.
    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<FetchedAsset, FetchError>>;
}

// == Http Fetcher ==
/// Default fetch primitive backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher with a 30 second timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Creates a fetcher with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Invalid(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Performs one GET and returns the body when the status is a success.
    pub async fn get_bytes(&self, url: &str) -> Result<FetchedAsset, FetchError> {
        debug!("Fetching: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout.as_millis() as u64)
            } else {
                FetchError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                message: format!("HTTP {} from {}", status, url),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await?.to_vec();

        Ok(FetchedAsset {
            bytes,
            content_type,
        })
    }
}

impl AssetSource for HttpFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<FetchedAsset, FetchError>> {
        let url = url.to_string();
        Box::pin(async move { self.get_bytes(&url).await })
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(FetchError::http(503).kind(), ErrorKind::Http(503));
        assert_eq!(FetchError::Network("reset".into()).kind(), ErrorKind::Network);
        assert_eq!(FetchError::Timeout(100).kind(), ErrorKind::Timeout);
        assert_eq!(FetchError::Invalid("bad".into()).kind(), ErrorKind::Programming);
        assert_eq!(FetchError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_exhausted_kind_is_last_kind() {
        let err = FetchError::RetriesExhausted {
            attempts: 3,
            last: Box::new(FetchError::http(429)),
        };
        assert_eq!(err.kind(), ErrorKind::Http(429));
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_request_context_builders() {
        let ctx = RequestContext::get("https://example.com/a.png");
        assert_eq!(ctx.method, HttpMethod::Get);
        assert!(ctx.retry.is_none());

        let ctx = ctx.with_retry(RetryConfig::no_retry());
        assert_eq!(ctx.retry.unwrap().max_attempts, 1);
    }

    #[test]
    fn test_method_display() {
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }

    #[tokio::test]
    async fn test_http_fetcher_connection_failure_is_network_error() {
        let fetcher = HttpFetcher::with_timeout(Duration::from_millis(500)).unwrap();
        // Port 9 (discard) on localhost is closed in test environments
        let result = fetcher.get_bytes("http://127.0.0.1:9/none").await;
        assert!(matches!(
            result,
            Err(FetchError::Network(_)) | Err(FetchError::Timeout(_))
        ));
    }
}
