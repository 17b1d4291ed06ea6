use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response, StatusCode};
use thiserror::Error;

/// Custom error type for outbound HTTP calls
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Connecting to or talking with the upstream failed
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// No response headers arrived before the deadline
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The outgoing request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// Port for every outbound HTTP call made by the gateway.
///
/// Both operations carry an explicit deadline. An elapsed deadline surfaces as
/// [`HttpClientError::Timeout`] and dropping the returned future cancels the
/// call.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Forward a request to an upstream.
    ///
    /// `timeout` bounds the time until response headers arrive; the body is
    /// streamed back afterwards.
    async fn send_request(
        &self,
        req: Request<AxumBody>,
        timeout: Duration,
    ) -> HttpClientResult<Response<AxumBody>>;

    /// `GET url` and report the status. The body is drained and discarded.
    async fn probe(&self, url: &str, timeout: Duration) -> HttpClientResult<StatusCode>;
}
