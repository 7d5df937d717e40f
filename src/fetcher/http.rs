//! Rate-limited HTTP client for the upstream history API
//!
//! One `reqwest::Client` is reused for every request. Each [`fetch`] call:
//! - takes the next credential from the pool (round-robin)
//! - walks the endpoint's primary path, then fallbacks on 404
//! - retries 429/5xx/transport failures via [`RetryState`]
//! - unwraps the response into a [`NormalizedPayload`]
//!
//! [`fetch`]: HistoryFetcher::fetch

use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use super::retry::{classify_status, ResponseClass, RetryDecision, TransientFailure};
use super::{
    CredentialPool, FetcherError, FetcherResult, HistoryFetcher, NormalizedPayload, RetryPolicy,
    RetryState,
};
use crate::metrics::{record_retry_backoff, HttpRequestMetrics};
use crate::registry::{EndpointRegistry, QueryContext};

/// Default upstream base URL
pub const DEFAULT_BASE_URL: &str = "https://api.coinalyze.net/v1";

/// Default per-request deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = concat!("coinalyze-exporter/", env!("CARGO_PKG_VERSION"));

/// Authenticated, retrying client for history endpoints
#[derive(Debug)]
pub struct RateLimitedClient {
    client: Client,
    base_url: String,
    credentials: CredentialPool,
    registry: EndpointRegistry,
    policy: RetryPolicy,
}

impl RateLimitedClient {
    /// Create a client with the default timeout and retry policy
    ///
    /// # Arguments
    /// * `base_url` - API root without trailing slash (e.g. "https://api.coinalyze.net/v1")
    /// * `credentials` - Token pool owned by this client
    /// * `registry` - Endpoint descriptors used to resolve categories
    pub fn new(
        base_url: impl Into<String>,
        credentials: CredentialPool,
        registry: EndpointRegistry,
    ) -> FetcherResult<Self> {
        Ok(Self {
            client: build_http_client(DEFAULT_TIMEOUT)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            registry,
            policy: RetryPolicy::default(),
        })
    }

    /// Replace the per-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> FetcherResult<Self> {
        self.client = build_http_client(timeout)?;
        Ok(self)
    }

    /// Replace the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn fetch_with_retry(
        &self,
        category: &str,
        params: &QueryContext<'_>,
    ) -> FetcherResult<NormalizedPayload> {
        let descriptor = self
            .registry
            .get(category)
            .ok_or_else(|| FetcherError::UnknownCategory(category.to_string()))?;

        // One credential per call, whatever the outcome
        let token = self.credentials.next_token();
        let query = descriptor.query(params);
        let paths: Vec<&str> = descriptor.paths().collect();

        let mut path_index = 0;
        let mut state = RetryState::new();

        loop {
            let path = paths[path_index];
            let url = format!("{}{}", self.base_url, path);
            let request_metrics = HttpRequestMetrics::start(category, path, state.attempts() + 1);

            let sent = self
                .client
                .get(&url)
                .bearer_auth(token)
                .header(ACCEPT, "application/json")
                .query(&query)
                .send()
                .await;

            let failure = match sent {
                Err(e) => {
                    request_metrics.record_network_error(&e.to_string());
                    TransientFailure::Transport(e.to_string())
                }
                Ok(response) => {
                    let status = response.status();
                    request_metrics.record_complete(status.as_u16());
                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);

                    match classify_status(status, retry_after.as_deref()) {
                        ResponseClass::Success => match response.bytes().await {
                            Ok(body) => {
                                debug!(
                                    category,
                                    path,
                                    attempt = state.attempts() + 1,
                                    bytes = body.len(),
                                    "Request succeeded"
                                );
                                return decode_body(&body);
                            }
                            Err(e) => TransientFailure::Transport(format!(
                                "failed to read response body: {e}"
                            )),
                        },
                        ResponseClass::Transient(failure) => failure,
                        ResponseClass::NotFound => {
                            if path_index + 1 < paths.len() {
                                path_index += 1;
                                debug!(
                                    category,
                                    from = path,
                                    to = paths[path_index],
                                    "Primary path not found, trying fallback"
                                );
                                continue;
                            }
                            return Err(FetcherError::UpstreamError(404));
                        }
                        ResponseClass::AuthRejected(code) => {
                            warn!(category, path, status = code, "Credential rejected");
                            return Err(FetcherError::AuthRejected(code));
                        }
                        ResponseClass::ClientError(code) => {
                            return Err(FetcherError::UpstreamError(code));
                        }
                    }
                }
            };

            match state.on_transient(&self.policy, &failure) {
                RetryDecision::RetryAfter(wait) => {
                    warn!(
                        category,
                        path,
                        attempt = state.attempts(),
                        max_attempts = self.policy.max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        "{}, retrying",
                        failure.describe()
                    );
                    record_retry_backoff(category, wait);
                    tokio::time::sleep(wait).await;
                }
                RetryDecision::GiveUp {
                    attempts,
                    last_error,
                } => {
                    warn!(category, path, attempts, "Retries exhausted: {}", last_error);
                    return Err(FetcherError::ExhaustedRetries {
                        attempts,
                        last_error,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl HistoryFetcher for RateLimitedClient {
    async fn fetch(
        &self,
        category: &str,
        params: &QueryContext<'_>,
    ) -> FetcherResult<NormalizedPayload> {
        self.fetch_with_retry(category, params).await
    }
}

/// Build the shared HTTP client with a fixed per-request deadline
pub fn build_http_client(timeout: Duration) -> FetcherResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| FetcherError::Configuration(format!("Failed to build HTTP client: {e}")))
}

fn decode_body(body: &[u8]) -> FetcherResult<NormalizedPayload> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| FetcherError::InvalidResponse(format!("body is not JSON: {e}")))?;
    Ok(NormalizedPayload::from_value(value))
}
