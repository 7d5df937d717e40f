//! Completion ledger persistence
//!
//! One ledger file per (symbol, interval) records the terminal outcome of
//! every unit attempted for that pair. Writes are atomic (temp file, fsync,
//! rename, fsync dir) and serialized through an `fd-lock` lock file.

use crate::Interval;
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Current ledger schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed ledger file size (64 MiB) to prevent memory exhaustion
pub const MAX_STATE_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Longest failure reason kept in a ledger entry
const MAX_REASON_LEN: usize = 512;

/// Terminal outcome of a unit
///
/// Serialized literally as `"ok"` or `"error:<reason>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum UnitStatus {
    /// Fetched and durably persisted
    Ok,
    /// Terminal failure with reason
    Error(String),
}

impl UnitStatus {
    /// Failure status with the reason flattened to one bounded line
    pub fn error(reason: impl AsRef<str>) -> Self {
        let mut flat: String = reason
            .as_ref()
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        if let Some((cut, _)) = flat.char_indices().nth(MAX_REASON_LEN) {
            flat.truncate(cut);
        }
        UnitStatus::Error(flat)
    }

    /// Whether this is `ok`
    pub fn is_ok(&self) -> bool {
        matches!(self, UnitStatus::Ok)
    }

    /// Failure reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            UnitStatus::Ok => None,
            UnitStatus::Error(reason) => Some(reason),
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Ok => f.write_str("ok"),
            UnitStatus::Error(reason) => write!(f, "error:{reason}"),
        }
    }
}

impl From<UnitStatus> for String {
    fn from(status: UnitStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for UnitStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        if value == "ok" {
            return Ok(UnitStatus::Ok);
        }
        match value.strip_prefix("error:") {
            Some(reason) => Ok(UnitStatus::Error(reason.to_string())),
            None => Err(format!("invalid unit status: {value}")),
        }
    }
}

/// Stored outcome of one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// Outcome
    pub status: UnitStatus,
    /// When the outcome was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Per-ledger outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreTally {
    /// Entries marked `ok`
    pub ok: usize,
    /// Entries marked `error:*`
    pub failed: usize,
}

/// Completion records for one (symbol, interval) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionLedger {
    schema_version: String,
    symbol: String,
    interval: Interval,
    entries: BTreeMap<String, CompletionRecord>,
    updated_at: i64,
}

impl CompletionLedger {
    /// Empty ledger
    pub fn new(symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            symbol: symbol.into(),
            interval,
            entries: BTreeMap::new(),
            updated_at: Utc::now().timestamp_millis(),
        }
    }

    /// Symbol this ledger belongs to
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Interval this ledger belongs to
    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Entries keyed by `YYYYMMDD/category`
    pub fn entries(&self) -> &BTreeMap<String, CompletionRecord> {
        &self.entries
    }

    /// Look up one entry
    pub fn get(&self, entry: &str) -> Option<&CompletionRecord> {
        self.entries.get(entry)
    }

    /// Record an outcome, replacing any earlier one
    pub fn set(&mut self, entry: impl Into<String>, status: UnitStatus) {
        let now = Utc::now();
        self.entries.insert(
            entry.into(),
            CompletionRecord {
                status,
                recorded_at: now,
            },
        );
        self.updated_at = now.timestamp_millis();
    }

    /// Count outcomes
    pub fn tally(&self) -> StoreTally {
        self.entries
            .values()
            .fold(StoreTally::default(), |mut tally, record| {
                if record.status.is_ok() {
                    tally.ok += 1;
                } else {
                    tally.failed += 1;
                }
                tally
            })
    }

    /// Save ledger with atomic writes and file locking
    pub fn save(&self, path: &Path) -> Result<(), ResumeError> {
        debug!(
            path = %path.display(),
            entries = self.entries.len(),
            "Saving completion ledger"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let lock_file = open_lock_file(path)?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;

        // Flush and sync before the rename so a crash never leaves a torn file
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }

    /// Load ledger from file under a shared lock
    pub fn load(path: &Path) -> Result<Self, ResumeError> {
        debug!(path = %path.display(), "Loading completion ledger");

        let lock_file = open_lock_file(path)?;
        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let ledger: CompletionLedger = serde_json::from_str(&contents).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to deserialize completion ledger");
            ResumeError::DeserializationError(format!("{}: {e}", path.display()))
        })?;

        if ledger.schema_version != SCHEMA_VERSION {
            warn!(
                found_version = %ledger.schema_version,
                expected_version = SCHEMA_VERSION,
                "Completion ledger schema version mismatch"
            );
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: ledger.schema_version,
            });
        }

        Ok(ledger)
    }
}

fn open_lock_file(path: &Path) -> Result<std::fs::File, ResumeError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path.with_extension("lock"))
        .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))
}

/// Errors related to completion state
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// Ledger file belongs to a different (symbol, interval)
    #[error("ledger {path} belongs to {found}, expected {expected}")]
    LedgerMismatch {
        /// Ledger path
        path: String,
        /// Expected `symbol/interval`
        expected: String,
        /// Found `symbol/interval`
        found: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
