//! Export command implementation

use super::{Cli, CliError, OutputFormat};
use crate::downloader::{
    ExportRequest, ExportScheduler, ExportSummary, FailedUnitPolicy, RetentionPolicy,
};
use crate::fetcher::http::DEFAULT_BASE_URL;
use crate::fetcher::{CredentialPool, RateLimitedClient, RetryPolicy};
use crate::notify::WebhookNotifier;
use crate::output::SnapshotSink;
use crate::registry::EndpointRegistry;
use crate::shutdown::SharedShutdown;
use crate::{Interval, MarketSymbol};
use chrono::NaiveDate;
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Market symbols, comma-separated (e.g. BTCUSDT_PERP.A)
    #[arg(long, required = true, value_delimiter = ',')]
    pub symbols: Vec<MarketSymbol>,

    /// Intervals, comma-separated (1min ... daily; 1m/1h/1d aliases accepted)
    #[arg(long, value_delimiter = ',', default_value = "1hour")]
    pub intervals: Vec<Interval>,

    /// First UTC day (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last UTC day, inclusive (YYYY-MM-DD; default: today)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Categories, comma-separated (default: every registry category)
    #[arg(long, value_delimiter = ',')]
    pub categories: Option<Vec<String>>,

    /// Comma-separated API key pool
    #[arg(long, env = "API_KEYS", hide_env_values = true)]
    pub api_keys: Option<String>,

    /// Single API key (used when no pool is given)
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Upstream API base URL
    #[arg(long, env = "COINALYZE_BASE", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "COINALYZE_TIMEOUT", default_value_t = 15)]
    pub timeout_secs: u64,

    /// Endpoint registry file (default: built-in)
    #[arg(long)]
    pub registry: Option<PathBuf>,

    /// Override every category's pacing interval (milliseconds)
    #[arg(long)]
    pub pacing_ms: Option<u64>,

    /// Re-attempt units recorded as failed by earlier runs
    #[arg(long, default_value_t = false)]
    pub retry_failed: bool,

    /// Total attempts per request, including the first
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..=50))]
    pub max_attempts: u32,

    /// 429 wait when Retry-After is missing or malformed (seconds)
    #[arg(long, default_value_t = 60)]
    pub rate_limit_default_secs: u64,

    /// Minimum 429 wait (seconds)
    #[arg(long, default_value_t = 30)]
    pub rate_limit_floor_secs: u64,

    /// Maximum 429 wait (seconds)
    #[arg(long, default_value_t = 600)]
    pub rate_limit_max_secs: u64,

    /// Prune day partitions older than this many days during the run
    #[arg(long, env = "RETAIN_DAYS")]
    pub retain_days: Option<u32>,

    /// Prune cadence in processed units
    #[arg(long, default_value_t = 200)]
    pub prune_every: u64,

    /// Webhook receiving the run summary
    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Expose Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl ExportArgs {
    /// Credential pool from `--api-keys`, falling back to `--api-key`
    pub fn credentials(&self) -> Result<CredentialPool, CliError> {
        let pool = self
            .api_keys
            .as_deref()
            .filter(|keys| keys.split(',').any(|k| !k.trim().is_empty()));
        match (pool, self.api_key.as_deref()) {
            (Some(keys), _) => Ok(CredentialPool::from_delimited(keys)?),
            (None, Some(key)) => Ok(CredentialPool::new([key])?),
            (None, None) => Err(CliError::ConfigurationError(
                "missing API_KEY or API_KEYS".to_string(),
            )),
        }
    }

    /// Retry policy from the CLI knobs
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            rate_limit_default: Duration::from_secs(self.rate_limit_default_secs),
            rate_limit_floor: Duration::from_secs(self.rate_limit_floor_secs),
            rate_limit_max: Duration::from_secs(self.rate_limit_max_secs),
            ..RetryPolicy::default()
        }
    }

    fn load_registry(&self) -> Result<EndpointRegistry, CliError> {
        let mut registry = match &self.registry {
            Some(path) => EndpointRegistry::load_file(path)?,
            None => EndpointRegistry::builtin()?,
        };
        if let Some(ms) = self.pacing_ms {
            registry.set_all_pacing(Duration::from_millis(ms));
        }
        Ok(registry)
    }

    /// Execute the export command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        if let Some(addr) = self.metrics_addr {
            if let Err(e) = crate::metrics::init_metrics(addr) {
                warn!(error = %e, "Metrics exporter unavailable, continuing without it");
            }
        }

        let registry = self.load_registry()?;
        let categories = match &self.categories {
            Some(categories) => categories.clone(),
            None => registry.categories().into_iter().map(String::from).collect(),
        };

        let request = ExportRequest::new(
            self.symbols.clone(),
            self.intervals.clone(),
            self.start,
            self.end,
            categories,
        )?;

        let client = RateLimitedClient::new(&self.base_url, self.credentials()?, registry.clone())?
            .with_timeout(Duration::from_secs(self.timeout_secs))?
            .with_policy(self.retry_policy());

        let failed_policy = if self.retry_failed {
            FailedUnitPolicy::Retry
        } else {
            FailedUnitPolicy::Skip
        };

        let state_dir = cli.resolved_state_dir();
        info!(
            data_dir = %cli.data_dir.display(),
            state_dir = %state_dir.display(),
            base_url = %self.base_url,
            "Export configured"
        );

        let mut scheduler = ExportScheduler::new(
            client,
            SnapshotSink::new(&cli.data_dir),
            state_dir,
            registry,
        )
        .with_failed_policy(failed_policy)
        .with_shutdown(shutdown);

        if let Some(days) = self.retain_days {
            scheduler = scheduler.with_retention(RetentionPolicy {
                horizon_days: days,
                every_units: self.prune_every,
            });
        }
        if let Some(url) = self.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
            scheduler = scheduler.with_notifier(WebhookNotifier::new(url.trim())?);
        }

        let summary = scheduler.run(&request).await?;
        print_summary(cli.output_format, &request, &summary);
        Ok(())
    }
}

fn print_summary(format: OutputFormat, request: &ExportRequest, summary: &ExportSummary) {
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "start": request.start().to_string(),
                "end": request.end().to_string(),
                "units": request.unit_count(),
                "done": summary.done,
                "failed": summary.failed,
                "skipped": summary.skipped,
                "pruned": summary.pruned,
                "cancelled": summary.cancelled,
                "failures": summary.failures.iter().map(|f| serde_json::json!({
                    "unit": f.key.to_string(),
                    "reason": f.reason,
                })).collect::<Vec<_>>(),
            });
            println!("{output}");
        }
        OutputFormat::Human => {
            if summary.cancelled {
                println!("\nExport cancelled.");
            } else {
                println!("\nExport completed.");
            }
            println!("Range: {} .. {}", request.start(), request.end());
            println!("Done: {}", summary.done);
            println!("Failed: {}", summary.failed);
            println!("Skipped: {}", summary.skipped);
            if summary.pruned > 0 {
                println!("Pruned: {}", summary.pruned);
            }
            for failure in &summary.failures {
                println!("  {} -> {}", failure.key, failure.reason);
            }
        }
    }
}
