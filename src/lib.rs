//! # Coinalyze Exporter Library
//!
//! A resumable, rate-limited exporter for historical derivatives data
//! (open interest, funding, liquidations, long/short ratio, OHLCV) served by
//! the Coinalyze REST API.
//!
//! ## Features
//!
//! - **Credential Rotation**: Round-robin over a pool of API keys
//! - **Bounded Retries**: 429 handling with `Retry-After`, exponential backoff on 5xx
//! - **Path Failover**: Fallback endpoints tried on 404
//! - **Resume Capability**: Durable per-unit completion state, crash safe
//! - **Per-Category Pacing**: Independent jittered pacing for cheap and expensive endpoints
//! - **Snapshot Persistence**: Per-unit snapshot files plus append-only JSONL streams
//!
//! ## Quick Start
//!
//! ```no_run
//! use coinalyze_exporter::downloader::{ExportRequest, ExportScheduler};
//! use coinalyze_exporter::fetcher::{CredentialPool, RateLimitedClient};
//! use coinalyze_exporter::output::SnapshotSink;
//! use coinalyze_exporter::registry::EndpointRegistry;
//! use chrono::NaiveDate;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = EndpointRegistry::builtin()?;
//! let client = RateLimitedClient::new(
//!     "https://api.coinalyze.net/v1",
//!     CredentialPool::from_delimited("key-a,key-b")?,
//!     registry.clone(),
//! )?;
//!
//! let request = ExportRequest::new(
//!     vec!["BTCUSDT_PERP.A".parse()?],
//!     vec!["1hour".parse()?],
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     None,
//!     vec!["oi".to_string(), "fr".to_string()],
//! )?;
//!
//! let scheduler = ExportScheduler::new(client, SnapshotSink::new("./data"), "./state", registry);
//! let summary = scheduler.run(&request).await?;
//! println!("done={} failed={} skipped={}", summary.done, summary.failed, summary.skipped);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`registry`] - Endpoint descriptors per data category
//! - [`fetcher`] - Rate-limited upstream client and payload normalisation
//! - [`downloader`] - Work-unit enumeration and the export scheduler
//! - [`resume`] - Durable completion store
//! - [`output`] - Snapshot sink and retention
//! - [`notify`] - Downstream run summaries

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Export orchestration
pub mod downloader;

/// Upstream client
pub mod fetcher;

/// Production metrics
pub mod metrics;

/// Downstream notifications
pub mod notify;

/// Snapshot persistence
pub mod output;

/// Endpoint registry
pub mod registry;

/// Completion state for resumable exports
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Upstream symbol validation
pub mod symbol;

/// Work unit identity
pub mod unit;

pub use symbol::MarketSymbol;
pub use unit::{DayWindow, UnitKey};

/// Aggregation interval understood by the upstream history endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    /// 1 minute
    #[serde(rename = "1min")]
    OneMinute,
    /// 5 minutes
    #[serde(rename = "5min")]
    FiveMinutes,
    /// 15 minutes
    #[serde(rename = "15min")]
    FifteenMinutes,
    /// 30 minutes
    #[serde(rename = "30min")]
    ThirtyMinutes,
    /// 1 hour
    #[serde(rename = "1hour")]
    OneHour,
    /// 2 hours
    #[serde(rename = "2hour")]
    TwoHours,
    /// 4 hours
    #[serde(rename = "4hour")]
    FourHours,
    /// 6 hours
    #[serde(rename = "6hour")]
    SixHours,
    /// 12 hours
    #[serde(rename = "12hour")]
    TwelveHours,
    /// 1 day
    #[serde(rename = "daily")]
    Daily,
}

impl Interval {
    /// Every supported interval, shortest first
    pub const ALL: [Interval; 10] = [
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::TwoHours,
        Interval::FourHours,
        Interval::SixHours,
        Interval::TwelveHours,
        Interval::Daily,
    ];

    /// Upstream spelling, also used for directory and state file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1min",
            Interval::FiveMinutes => "5min",
            Interval::FifteenMinutes => "15min",
            Interval::ThirtyMinutes => "30min",
            Interval::OneHour => "1hour",
            Interval::TwoHours => "2hour",
            Interval::FourHours => "4hour",
            Interval::SixHours => "6hour",
            Interval::TwelveHours => "12hour",
            Interval::Daily => "daily",
        }
    }

    /// Convert interval to seconds
    pub fn to_seconds(&self) -> i64 {
        match self {
            Interval::OneMinute => 60,
            Interval::FiveMinutes => 300,
            Interval::FifteenMinutes => 900,
            Interval::ThirtyMinutes => 1_800,
            Interval::OneHour => 3_600,
            Interval::TwoHours => 7_200,
            Interval::FourHours => 14_400,
            Interval::SixHours => 21_600,
            Interval::TwelveHours => 43_200,
            Interval::Daily => 86_400,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    /// Accepts the upstream spelling and the common short aliases (`1m`, `1h`, `1d`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1min" | "1m" => Ok(Interval::OneMinute),
            "5min" | "5m" => Ok(Interval::FiveMinutes),
            "15min" | "15m" => Ok(Interval::FifteenMinutes),
            "30min" | "30m" => Ok(Interval::ThirtyMinutes),
            "1hour" | "1h" | "60min" => Ok(Interval::OneHour),
            "2hour" | "2h" => Ok(Interval::TwoHours),
            "4hour" | "4h" => Ok(Interval::FourHours),
            "6hour" | "6h" => Ok(Interval::SixHours),
            "12hour" | "12h" => Ok(Interval::TwelveHours),
            "daily" | "1d" => Ok(Interval::Daily),
            other => Err(format!("Invalid interval: {other}")),
        }
    }
}
