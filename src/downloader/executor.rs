//! Export scheduler
//!
//! Walks a request's units in enumeration order and drives each one through
//! `PENDING → FETCHING → {DONE, FAILED}`. Terminal outcomes are flushed to
//! the completion store after every unit, so a restart resumes at the first
//! unit without a recorded outcome.

use super::config::{jittered_pacing, FailedUnitPolicy, RetentionPolicy, SKIP_LOG_INTERVAL};
use super::progress::ProgressTracker;
use super::units::{ExportRequest, WorkUnit};
use super::ExportError;
use crate::fetcher::HistoryFetcher;
use crate::metrics::{record_pruned, record_unit, UnitOutcome};
use crate::notify::Notifier;
use crate::output::{SnapshotPack, SnapshotSink};
use crate::registry::EndpointRegistry;
use crate::resume::{CompletionStore, UnitStatus};
use crate::shutdown::{self, SharedShutdown};
use crate::UnitKey;
use chrono::Utc;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// A unit that ended in `error:*` during this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// Unit identity
    pub key: UnitKey,
    /// Recorded reason
    pub reason: String,
}

/// Tally of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Units fetched and persisted
    pub done: u64,
    /// Units that ended in a terminal failure
    pub failed: u64,
    /// Units already complete (or failed, under [`FailedUnitPolicy::Skip`])
    pub skipped: u64,
    /// Day partitions removed by retention
    pub pruned: u64,
    /// Whether shutdown ended the run early
    pub cancelled: bool,
    /// Failures recorded this run, in order
    pub failures: Vec<UnitFailure>,
}

/// Per-unit result inside the run loop
enum Step {
    Skipped,
    Done,
    Failed(String),
    Cancelled,
}

/// Resumable, paced export driver
pub struct ExportScheduler<F> {
    fetcher: F,
    sink: SnapshotSink,
    state_dir: PathBuf,
    registry: EndpointRegistry,
    failed_policy: FailedUnitPolicy,
    retention: Option<RetentionPolicy>,
    notifier: Option<Box<dyn Notifier>>,
    shutdown: Option<SharedShutdown>,
    progress_tracker: ProgressTracker,
}

impl<F: HistoryFetcher> ExportScheduler<F> {
    /// Create a scheduler
    ///
    /// # Arguments
    /// * `fetcher` - Upstream source, usually a [`crate::fetcher::RateLimitedClient`]
    /// * `sink` - Owner of the data tree
    /// * `state_dir` - Completion store root
    /// * `registry` - Pacing per category
    pub fn new(
        fetcher: F,
        sink: SnapshotSink,
        state_dir: impl Into<PathBuf>,
        registry: EndpointRegistry,
    ) -> Self {
        Self {
            fetcher,
            sink,
            state_dir: state_dir.into(),
            registry,
            failed_policy: FailedUnitPolicy::default(),
            retention: None,
            notifier: None,
            shutdown: shutdown::get_global_shutdown(),
            progress_tracker: ProgressTracker::default(),
        }
    }

    /// Choose how `error:*` units are treated
    pub fn with_failed_policy(mut self, policy: FailedUnitPolicy) -> Self {
        self.failed_policy = policy;
        self
    }

    /// Enable periodic retention pruning
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Send the final summary to `notifier`
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Customize progress update cadence
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = tracker;
        self
    }

    /// Run the export to completion (or cancellation)
    ///
    /// # Errors
    /// Only setup problems: unknown categories, or a completion store that
    /// cannot be opened or holds a corrupt ledger. Unit failures are recorded
    /// and counted, never returned.
    pub async fn run(&self, request: &ExportRequest) -> Result<ExportSummary, ExportError> {
        request.check_categories(&self.registry)?;

        let mut store = CompletionStore::open(&self.state_dir)?;
        for symbol in request.symbols() {
            for interval in request.intervals() {
                let tally = store.tally(symbol, *interval)?;
                debug!(
                    symbol = %symbol,
                    interval = %interval,
                    ok = tally.ok,
                    failed = tally.failed,
                    "Completion ledger ready"
                );
            }
        }

        info!(
            symbols = request.symbols().len(),
            intervals = request.intervals().len(),
            start = %request.start(),
            end = %request.end(),
            categories = ?request.categories(),
            units = request.unit_count(),
            "Starting export"
        );

        let mut summary = ExportSummary::default();
        let mut progress = self.progress_tracker.create_state(request.unit_count());
        let mut since_prune = 0u64;

        for unit in request.units() {
            if self.shutdown_requested() {
                info!("Shutdown requested - stopping before next unit");
                summary.cancelled = true;
                break;
            }

            progress.set_phase(Some(format!("{} {}", unit.key.symbol, unit.key.interval)));

            match self.process_unit(&mut store, &unit).await {
                Step::Skipped => {
                    summary.skipped += 1;
                    record_unit(&unit.key.category, UnitOutcome::Skipped);
                    progress.record(false);
                    if summary.skipped % SKIP_LOG_INTERVAL == 0 {
                        info!(skipped = summary.skipped, "Skipping completed units");
                    }
                }
                Step::Done => {
                    summary.done += 1;
                    since_prune += 1;
                    record_unit(&unit.key.category, UnitOutcome::Done);
                    progress.record(true);
                }
                Step::Failed(reason) => {
                    summary.failed += 1;
                    since_prune += 1;
                    record_unit(&unit.key.category, UnitOutcome::Failed);
                    progress.record(true);
                    summary.failures.push(UnitFailure {
                        key: unit.key.clone(),
                        reason,
                    });
                }
                Step::Cancelled => {
                    info!(unit = %unit.key, "Shutdown requested - unit left pending");
                    summary.cancelled = true;
                    break;
                }
            }

            if progress.should_emit_update() {
                info!("{}", progress.format_progress());
                progress.mark_emitted();
            }

            if let Some(retention) = self.retention {
                if retention.every_units > 0 && since_prune >= retention.every_units {
                    since_prune = 0;
                    summary.pruned += self.prune(retention);
                }
            }
        }

        if let Some(retention) = self.retention {
            summary.pruned += self.prune(retention);
        }

        info!(
            done = summary.done,
            failed = summary.failed,
            skipped = summary.skipped,
            pruned = summary.pruned,
            cancelled = summary.cancelled,
            "Export finished"
        );

        if let Some(notifier) = &self.notifier {
            let title = request
                .symbols()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            if let Err(e) = notifier.notify(&title, &summary).await {
                warn!(error = %e, "Failed to deliver run summary");
            }
        }

        Ok(summary)
    }

    async fn process_unit(&self, store: &mut CompletionStore, unit: &WorkUnit) -> Step {
        let key = &unit.key;

        let existing = match store.get(key) {
            Ok(record) => record.map(|r| r.status),
            Err(e) => {
                error!(unit = %key, error = %e, "Failed to read completion state");
                return Step::Failed(format!("state error: {e}"));
            }
        };

        match &existing {
            Some(UnitStatus::Ok) => {
                debug!(unit = %key, "Already complete, skipping");
                return Step::Skipped;
            }
            Some(UnitStatus::Error(reason)) if self.failed_policy == FailedUnitPolicy::Skip => {
                debug!(unit = %key, reason = %reason, "Previously failed, skipping");
                return Step::Skipped;
            }
            _ => {}
        }

        if self.sink.has_unit(key) {
            debug!(unit = %key, "Snapshot already on disk, marking complete");
            if let Err(e) = store.set(key, UnitStatus::Ok) {
                warn!(unit = %key, error = %e, "Failed to record existing snapshot");
            }
            return Step::Skipped;
        }

        let pacing = self
            .registry
            .get(&key.category)
            .map(|d| jittered_pacing(d.pacing()))
            .unwrap_or_default();
        if !self.pace(pacing).await {
            return Step::Cancelled;
        }

        debug!(unit = %key, from = unit.window.from, to = unit.window.to, "Fetching unit");
        let outcome = match self.fetcher.fetch(&key.category, &unit.query()).await {
            Ok(payload) => self.persist(key, SnapshotPack::new(key, payload)),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(records) => match store.set(key, UnitStatus::Ok) {
                Ok(()) => {
                    debug!(unit = %key, records, "Unit complete");
                    Step::Done
                }
                Err(e) => {
                    error!(unit = %key, error = %e, "Failed to record completion");
                    Step::Failed(format!("state error: {e}"))
                }
            },
            Err(reason) => {
                warn!(unit = %key, reason = %reason, "Unit failed");
                let status = UnitStatus::error(&reason);
                if let Err(e) = store.set(key, status) {
                    error!(unit = %key, error = %e, "Failed to record failure");
                }
                Step::Failed(reason)
            }
        }
    }

    /// Snapshot first, then stream; returns the record count
    fn persist(&self, key: &UnitKey, pack: SnapshotPack) -> Result<usize, String> {
        self.sink
            .write_unit(key, &pack)
            .map_err(|e| format!("local io: {e}"))?;
        if let Err(e) = self.sink.append_stream(key, &pack) {
            if let Err(discard) = self.sink.discard_unit(key) {
                warn!(unit = %key, error = %discard, "Failed to discard partial snapshot");
            }
            return Err(format!("local io: {e}"));
        }
        Ok(pack.history.len())
    }

    /// Sleep the pacing interval; false if shutdown interrupted it
    async fn pace(&self, pacing: std::time::Duration) -> bool {
        if pacing.is_zero() {
            return !self.shutdown_requested();
        }
        if let Some(shutdown) = &self.shutdown {
            tokio::select! {
                _ = tokio::time::sleep(pacing) => true,
                _ = shutdown.wait_for_shutdown() => false,
            }
        } else {
            tokio::time::sleep(pacing).await;
            true
        }
    }

    fn prune(&self, retention: RetentionPolicy) -> u64 {
        match self
            .sink
            .prune_older_than(retention.horizon_days, Utc::now().date_naive())
        {
            Ok(removed) => {
                record_pruned(removed as u64);
                removed as u64
            }
            Err(e) => {
                warn!(error = %e, "Retention pruning failed");
                0
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }
}
