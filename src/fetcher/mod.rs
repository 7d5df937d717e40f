//! Upstream history fetcher
//!
//! [`RateLimitedClient`] is the production implementation of
//! [`HistoryFetcher`]: authenticated GET with credential rotation, endpoint
//! path failover and a bounded retry state machine. The scheduler only sees
//! the trait, so tests can substitute an in-memory fetcher.

use crate::registry::QueryContext;
use async_trait::async_trait;

pub mod credentials;
pub mod http;
pub mod payload;
pub mod retry;

pub use credentials::CredentialPool;
pub use http::RateLimitedClient;
pub use payload::{NormalizedPayload, ResponseShape};
pub use retry::{RetryPolicy, RetryState};

/// Fetcher errors
///
/// Transient failures (429, 5xx, transport errors and timeouts) never escape
/// the client directly; they are retried and collapse into
/// [`FetcherError::ExhaustedRetries`] once the budget is consumed.
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Retry budget consumed by transient failures
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        /// Attempts made, including the first
        attempts: u32,
        /// Description of the last transient failure
        last_error: String,
    },

    /// Credential rejected (401/403)
    #[error("authentication rejected: HTTP {0}")]
    AuthRejected(u16),

    /// Terminal upstream status (404 on the last path, other 4xx)
    #[error("upstream error: HTTP {0}")]
    UpstreamError(u16),

    /// 2xx response whose body is not JSON
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Category missing from the endpoint registry
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    /// Client could not be configured
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Source of normalized history payloads, one request per call
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    /// Fetch one category for one symbol, interval and time window
    ///
    /// # Arguments
    /// * `category` - Registry category name (e.g. "oi")
    /// * `params` - Symbol, interval and window substituted into the endpoint schema
    ///
    /// # Returns
    /// The unwrapped list of records; an empty list is a valid result
    async fn fetch(
        &self,
        category: &str,
        params: &QueryContext<'_>,
    ) -> FetcherResult<NormalizedPayload>;
}
