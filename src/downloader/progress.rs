//! Progress tracking for long-running exports.
//!
//! The scheduler reports progress as processed units against the request's
//! total unit count. Updates are throttled by time and by percentage step so
//! a multi-year backfill does not flood the logs.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_PERCENTAGE_STEP: f64 = 10.0;

/// Lightweight builder that controls update cadence.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    update_interval: Duration,
    min_percentage_step: f64,
}

impl ProgressTracker {
    /// Create a tracker with custom interval and percentage step.
    pub fn new(update_interval: Duration, min_percentage_step: f64) -> Self {
        Self {
            update_interval,
            min_percentage_step,
        }
    }

    /// Build a [`ProgressState`] for a run of `total_units`.
    pub fn create_state(&self, total_units: u64) -> ProgressState {
        let now = Instant::now();
        ProgressState {
            processed: 0,
            fetched: 0,
            total_units,
            start_time: now,
            last_update: now,
            update_interval: self.update_interval,
            last_reported_percentage: 0.0,
            min_percentage_step: self.min_percentage_step,
            current_phase: None,
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_INTERVAL, DEFAULT_PERCENTAGE_STEP)
    }
}

/// Progress of one export run.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Units visited so far (fetched, failed or skipped).
    pub processed: u64,
    /// Units that went to the network.
    pub fetched: u64,
    /// Units in the request.
    pub total_units: u64,
    start_time: Instant,
    last_update: Instant,
    update_interval: Duration,
    last_reported_percentage: f64,
    min_percentage_step: f64,
    current_phase: Option<String>,
}

impl ProgressState {
    /// Count one visited unit.
    pub fn record(&mut self, fetched: bool) {
        self.processed = self.processed.saturating_add(1);
        if fetched {
            self.fetched = self.fetched.saturating_add(1);
        }
    }

    /// Set descriptive phase label (e.g., "BTCUSDT_PERP.A 1hour").
    pub fn set_phase<S: Into<String>>(&mut self, phase: Option<S>) {
        self.current_phase = phase.map(Into::into);
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_units == 0 {
            return 100.0;
        }
        (self.processed as f64 / self.total_units as f64) * 100.0
    }

    /// Whether a progress update should be emitted based on time or percentage.
    pub fn should_emit_update(&self) -> bool {
        if self.processed == 0 {
            return false;
        }
        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }
        self.last_update.elapsed() >= self.update_interval
    }

    /// Call after emitting a progress log to reset timers and cached percentage.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Estimate remaining time from the fetch rate so far.
    ///
    /// Skipped units are nearly free, so only fetched units drive the rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if self.fetched == 0 || elapsed <= 0.0 {
            return None;
        }
        let per_unit = elapsed / self.fetched as f64;
        let remaining = self.total_units.saturating_sub(self.processed);
        Some(Duration::from_secs_f64(per_unit * remaining as f64))
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} units - {:.1}% complete",
            self.processed,
            self.total_units,
            self.percentage()
        )];

        if let Some(phase) = &self.current_phase {
            parts.push(format!("({phase})"));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
