//! Snapshot sink: per-unit files, append streams and retention

use super::path::{parse_day_dir, SnapshotPaths};
use super::{OutputError, OutputResult};
use crate::fetcher::NormalizedPayload;
use crate::UnitKey;
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Canonical record written to snapshot files and stream lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPack {
    /// Market symbol
    pub symbol: String,
    /// Interval (upstream spelling)
    pub interval: String,
    /// UTC day, `YYYY-MM-DD`
    pub day: String,
    /// Registry category
    pub category: String,
    /// Fetch time, unix seconds
    pub fetched_at: i64,
    /// Normalized records
    pub history: Vec<Value>,
}

impl SnapshotPack {
    /// Build the pack for a freshly fetched unit
    pub fn new(key: &UnitKey, payload: NormalizedPayload) -> Self {
        Self {
            symbol: key.symbol.to_string(),
            interval: key.interval.to_string(),
            day: key.day.format("%Y-%m-%d").to_string(),
            category: key.category.clone(),
            fetched_at: Utc::now().timestamp(),
            history: payload.into_records(),
        }
    }
}

/// Owner of the on-disk data tree
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    root: PathBuf,
}

impl SnapshotSink {
    /// Sink rooted at `root`; directories are created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact paths for a unit
    pub fn paths(&self, key: &UnitKey) -> SnapshotPaths {
        SnapshotPaths::new(&self.root, key)
    }

    /// Whether both of the unit's artifacts exist
    ///
    /// A snapshot without its stream file is an interrupted write, not a
    /// complete unit.
    pub fn has_unit(&self, key: &UnitKey) -> bool {
        let paths = self.paths(key);
        paths.snapshot().is_file() && paths.stream().is_file()
    }

    /// Remove the unit's snapshot file, if present
    pub fn discard_unit(&self, key: &UnitKey) -> OutputResult<()> {
        let target = self.paths(key).snapshot();
        match std::fs::remove_file(&target) {
            Ok(()) => {
                debug!(path = %target.display(), "Snapshot discarded");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OutputError::IoError(format!(
                "Failed to remove {}: {e}",
                target.display()
            ))),
        }
    }

    /// Atomically write (or overwrite) the unit's snapshot file
    ///
    /// # Returns
    /// Path of the written file
    pub fn write_unit(&self, key: &UnitKey, pack: &SnapshotPack) -> OutputResult<PathBuf> {
        let paths = self.paths(key);
        let day_dir = paths.day_dir();
        std::fs::create_dir_all(day_dir).map_err(|e| {
            OutputError::IoError(format!("Failed to create {}: {e}", day_dir.display()))
        })?;

        let json = serde_json::to_vec(pack)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(day_dir)
            .map_err(|e| OutputError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(&json)
            .map_err(|e| OutputError::IoError(format!("Failed to write snapshot: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush snapshot: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync snapshot: {e}")))?;

        let target = paths.snapshot();
        temp_file
            .persist(&target)
            .map_err(|e| OutputError::IoError(format!("Failed to persist snapshot: {e}")))?;

        if let Ok(dir) = std::fs::File::open(day_dir) {
            let _ = dir.sync_all();
        }

        debug!(
            path = %target.display(),
            records = pack.history.len(),
            "Snapshot written"
        );
        Ok(target)
    }

    /// Append one line to the unit's stream file
    pub fn append_stream(&self, key: &UnitKey, pack: &SnapshotPack) -> OutputResult<PathBuf> {
        let paths = self.paths(key);
        std::fs::create_dir_all(paths.day_dir()).map_err(|e| {
            OutputError::IoError(format!(
                "Failed to create {}: {e}",
                paths.day_dir().display()
            ))
        })?;

        let mut line = serde_json::to_vec(pack)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;
        line.push(b'\n');

        let target = paths.stream();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)
            .map_err(|e| {
                OutputError::IoError(format!("Failed to open {}: {e}", target.display()))
            })?;
        file.write_all(&line)
            .map_err(|e| OutputError::IoError(format!("Failed to append stream: {e}")))?;
        file.sync_data()
            .map_err(|e| OutputError::FlushError(format!("Failed to sync stream: {e}")))?;

        Ok(target)
    }

    /// Remove day partitions strictly older than `today - horizon_days`
    ///
    /// Entries whose name is not a `YYYYMMDD` date are left alone.
    ///
    /// # Returns
    /// Number of day directories removed
    pub fn prune_older_than(&self, horizon_days: u32, today: NaiveDate) -> OutputResult<usize> {
        let Some(cutoff) = today.checked_sub_days(Days::new(u64::from(horizon_days))) else {
            return Ok(0);
        };
        if !self.root.is_dir() {
            return Ok(0);
        }

        let mut removed = 0;
        for symbol_dir in subdirectories(&self.root)? {
            for interval_dir in subdirectories(&symbol_dir)? {
                for day_dir in subdirectories(&interval_dir)? {
                    let day = day_dir
                        .file_name()
                        .and_then(|n| n.to_str())
                        .and_then(parse_day_dir);
                    match day {
                        Some(day) if day < cutoff => {
                            if let Err(e) = std::fs::remove_dir_all(&day_dir) {
                                warn!(path = %day_dir.display(), error = %e, "Failed to prune day partition");
                                continue;
                            }
                            removed += 1;
                        }
                        _ => {}
                    }
                }
            }
        }

        if removed > 0 {
            info!(removed, cutoff = %cutoff, "Pruned day partitions");
        }
        Ok(removed)
    }
}

fn subdirectories(dir: &Path) -> OutputResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| OutputError::IoError(format!("Failed to read {}: {e}", dir.display())))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| OutputError::IoError(e.to_string()))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}
