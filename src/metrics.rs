//! Production observability metrics for the exporter
//!
//! Counters and histograms for upstream requests (per category and status),
//! 429 responses, retry backoff, and unit outcomes.
//!
//! ## Architecture
//!
//! - Uses the `metrics` facade; calls are no-ops until a recorder is installed
//! - Optional Prometheus scrape endpoint installed by [`init_metrics`]

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Must run inside a Tokio runtime. Idempotent.
///
/// # Arguments
/// * `addr` - Socket address to bind the scrape endpoint (e.g., "0.0.0.0:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| {
            METRICS_INITIALIZED.store(false, Ordering::SeqCst);
            format!("Failed to install Prometheus exporter: {e}")
        })?;

    describe_counter!(
        "upstream_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the upstream API"
    );

    describe_counter!(
        "upstream_429_total",
        Unit::Count,
        "Total number of 429 rate limit responses received"
    );

    describe_counter!(
        "upstream_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );

    describe_histogram!(
        "upstream_request_duration_seconds",
        Unit::Seconds,
        "Upstream request duration in seconds"
    );

    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Backoff waited before a retry"
    );

    describe_counter!(
        "export_units_total",
        Unit::Count,
        "Work units processed, labelled by outcome"
    );

    describe_counter!(
        "retention_pruned_partitions_total",
        Unit::Count,
        "Day partitions removed by retention"
    );

    Ok(())
}

/// Check if metrics system is initialized
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and labelling for one upstream HTTP attempt
pub struct HttpRequestMetrics {
    category: String,
    path: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP attempt
    pub fn start(category: impl Into<String>, path: impl Into<String>, attempt: u32) -> Self {
        Self {
            category: category.into(),
            path: path.into(),
            start_time: Instant::now(),
            correlation_id: generate_correlation_id(),
            attempt,
        }
    }

    /// Record completion with an HTTP status
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "upstream_requests_total",
            "category" => self.category.clone(),
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "upstream_request_duration_seconds",
            "category" => self.category.clone(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!(
                "upstream_429_total",
                "category" => self.category.clone(),
            )
            .increment(1);
        }

        debug!(
            correlation_id = %self.correlation_id,
            category = %self.category,
            path = %self.path,
            attempt = self.attempt,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "Upstream request completed"
        );
    }

    /// Record a transport error (no status code)
    pub fn record_network_error(&self, error: &str) {
        let duration = self.start_time.elapsed();

        counter!(
            "upstream_requests_total",
            "category" => self.category.clone(),
            "status" => "network_error",
        )
        .increment(1);

        histogram!(
            "upstream_request_duration_seconds",
            "category" => self.category.clone(),
        )
        .record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            category = %self.category,
            path = %self.path,
            attempt = self.attempt,
            duration_ms = duration.as_millis() as u64,
            error = %error,
            "Upstream transport error"
        );
    }

    /// Get the correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(category: &str, duration: Duration) {
    counter!(
        "upstream_retries_total",
        "category" => category.to_string(),
    )
    .increment(1);

    histogram!(
        "retry_backoff_duration_seconds",
        "category" => category.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Outcome label for [`record_unit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Fetched and persisted
    Done,
    /// Terminal failure recorded
    Failed,
    /// Already complete
    Skipped,
}

impl UnitOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            UnitOutcome::Done => "done",
            UnitOutcome::Failed => "failed",
            UnitOutcome::Skipped => "skipped",
        }
    }
}

/// Record the outcome of one work unit
pub fn record_unit(category: &str, outcome: UnitOutcome) {
    counter!(
        "export_units_total",
        "category" => category.to_string(),
        "outcome" => outcome.as_str(),
    )
    .increment(1);
}

/// Record day partitions removed by retention
pub fn record_pruned(count: u64) {
    counter!("retention_pruned_partitions_total").increment(count);
}
