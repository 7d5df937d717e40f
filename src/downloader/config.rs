//! Export configuration constants and pacing

use rand::Rng;
use std::time::Duration;

/// Relative pacing jitter: each wait is drawn from `pacing * [1 - J, 1 + J]`.
pub const PACING_JITTER: f64 = 0.3;

/// Emit an `info` progress line every N skipped units.
/// Skips are otherwise logged at `debug` only.
pub const SKIP_LOG_INTERVAL: u64 = 500;

/// Default retention cadence: prune every N processed units.
pub const DEFAULT_RETENTION_EVERY_UNITS: u64 = 200;

/// What to do with units whose stored status is `error:*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedUnitPolicy {
    /// Treat failures as terminal; never re-attempt
    #[default]
    Skip,
    /// Re-attempt failed units on the next run
    Retry,
}

/// Periodic pruning of old day partitions during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Keep day partitions newer than `today - horizon_days`
    pub horizon_days: u32,
    /// Prune after every N processed units (and once at the end)
    pub every_units: u64,
}

impl RetentionPolicy {
    /// Policy with the default cadence
    pub fn new(horizon_days: u32) -> Self {
        Self {
            horizon_days,
            every_units: DEFAULT_RETENTION_EVERY_UNITS,
        }
    }
}

/// Pacing interval with ±[`PACING_JITTER`] applied
pub fn jittered_pacing(base: Duration) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let factor = rand::thread_rng().gen_range((1.0 - PACING_JITTER)..=(1.0 + PACING_JITTER));
    base.mul_f64(factor)
}
