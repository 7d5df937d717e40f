//! Retry policy and per-request retry state machine
//!
//! A request moves through attempts until it either succeeds, hits a
//! terminal classification, or the attempt budget runs out. Rate limiting
//! (429) and server/transport failures share one budget.

use reqwest::StatusCode;
use std::time::Duration;

/// Default total attempts per request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Default first backoff after a 5xx or transport failure
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(5);

/// Default growth factor between consecutive backoffs
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.8;

/// Default backoff ceiling
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Wait used when a 429 carries no usable `Retry-After`
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Lower bound on any 429 wait
pub const DEFAULT_RATE_LIMIT_FLOOR: Duration = Duration::from_secs(30);

/// Upper bound on any 429 wait
pub const DEFAULT_RATE_LIMIT_MAX: Duration = Duration::from_secs(600);

/// Tunable retry constants
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Backoff after the first transient failure
    pub base_backoff: Duration,
    /// Multiplier applied per further failure
    pub backoff_factor: f64,
    /// Backoff ceiling
    pub max_backoff: Duration,
    /// 429 wait when `Retry-After` is missing or malformed
    pub rate_limit_default: Duration,
    /// Minimum 429 wait
    pub rate_limit_floor: Duration,
    /// Maximum 429 wait; the floor wins if the two conflict
    pub rate_limit_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_backoff: DEFAULT_MAX_BACKOFF,
            rate_limit_default: DEFAULT_RATE_LIMIT_WAIT,
            rate_limit_floor: DEFAULT_RATE_LIMIT_FLOOR,
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
        }
    }
}

impl RetryPolicy {
    /// Backoff after the `failures`-th consecutive server/transport failure (1-based)
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(64) as i32;
        let secs = self.base_backoff.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Wait before retrying a 429, given the raw `Retry-After` header
    pub fn rate_limit_delay(&self, retry_after: Option<&str>) -> Duration {
        retry_after
            .and_then(parse_retry_after)
            .unwrap_or(self.rate_limit_default)
            .min(self.rate_limit_max)
            .max(self.rate_limit_floor)
    }
}

/// Parse a `Retry-After` value given in (possibly fractional) seconds
///
/// HTTP-date values, negatives and non-finite numbers yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Transient failure kinds; all consume the retry budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientFailure {
    /// HTTP 429 with the raw `Retry-After` header, if any
    RateLimited {
        /// Raw header value
        retry_after: Option<String>,
    },
    /// HTTP 5xx
    ServerError(u16),
    /// Connection failure, timeout, or body read failure
    Transport(String),
}

impl TransientFailure {
    /// Short description for logs and error messages
    pub fn describe(&self) -> String {
        match self {
            TransientFailure::RateLimited { .. } => "rate limit exceeded (429)".to_string(),
            TransientFailure::ServerError(status) => format!("server error ({status})"),
            TransientFailure::Transport(message) => format!("transport error: {message}"),
        }
    }
}

/// Classification of one HTTP outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx
    Success,
    /// Retry with backoff
    Transient(TransientFailure),
    /// 404; try the next fallback path if one remains
    NotFound,
    /// 401/403; terminal
    AuthRejected(u16),
    /// Any other 4xx; terminal
    ClientError(u16),
}

/// Classify an HTTP status
pub fn classify_status(status: StatusCode, retry_after: Option<&str>) -> ResponseClass {
    match status.as_u16() {
        429 => ResponseClass::Transient(TransientFailure::RateLimited {
            retry_after: retry_after.map(str::to_string),
        }),
        404 => ResponseClass::NotFound,
        code @ (401 | 403) => ResponseClass::AuthRejected(code),
        code if status.is_server_error() => {
            ResponseClass::Transient(TransientFailure::ServerError(code))
        }
        code if status.is_client_error() => ResponseClass::ClientError(code),
        _ if status.is_success() => ResponseClass::Success,
        // 1xx/3xx are not expected from a JSON API once redirects are followed
        code => ResponseClass::ClientError(code),
    }
}

/// What the caller should do after a transient failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the duration, then attempt again
    RetryAfter(Duration),
    /// Budget consumed
    GiveUp {
        /// Attempts made
        attempts: u32,
        /// Last failure description
        last_error: String,
    },
}

/// Mutable retry state for one request
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    attempts: u32,
    server_failures: u32,
    last_backoff: Duration,
}

impl RetryState {
    /// Fresh state, no attempts made
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Most recent wait chosen
    pub fn last_backoff(&self) -> Duration {
        self.last_backoff
    }

    /// Record a transient failure of the current attempt and decide what's next
    pub fn on_transient(&mut self, policy: &RetryPolicy, failure: &TransientFailure) -> RetryDecision {
        self.attempts += 1;

        if self.attempts >= policy.max_attempts {
            return RetryDecision::GiveUp {
                attempts: self.attempts,
                last_error: failure.describe(),
            };
        }

        let wait = match failure {
            TransientFailure::RateLimited { retry_after } => {
                policy.rate_limit_delay(retry_after.as_deref())
            }
            TransientFailure::ServerError(_) | TransientFailure::Transport(_) => {
                self.server_failures += 1;
                policy.backoff_for(self.server_failures)
            }
        };
        self.last_backoff = wait;
        RetryDecision::RetryAfter(wait)
    }
}
