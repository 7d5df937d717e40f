//! Hierarchical path generation for snapshot artifacts
//!
//! Layout under the data root:
//!
//! ```text
//! <root>/<symbol>/<interval>/<YYYYMMDD>/<category>.json    per-unit snapshot
//! <root>/<symbol>/<interval>/<YYYYMMDD>/<category>.jsonl   append stream
//! ```
//!
//! # Usage Example
//!
//! ```rust
//! use coinalyze_exporter::output::SnapshotPaths;
//! use coinalyze_exporter::{Interval, UnitKey};
//! use chrono::NaiveDate;
//! use std::path::Path;
//!
//! let key = UnitKey::new(
//!     "BTCUSDT_PERP.A".parse().unwrap(),
//!     Interval::OneHour,
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     "oi",
//! );
//! let paths = SnapshotPaths::new(Path::new("data"), &key);
//! assert_eq!(
//!     paths.snapshot(),
//!     Path::new("data/BTCUSDT_PERP.A/1hour/20240101/oi.json")
//! );
//! ```

use crate::unit::DAY_DIR_FORMAT;
use crate::UnitKey;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Artifact paths for one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    day_dir: PathBuf,
    category: String,
}

impl SnapshotPaths {
    /// Resolve paths for `key` under `root`
    ///
    /// Symbols are validated at parse time, so every component is a plain name.
    pub fn new(root: &Path, key: &UnitKey) -> Self {
        Self {
            day_dir: root
                .join(key.symbol.as_str())
                .join(key.interval.as_str())
                .join(key.day_dir()),
            category: key.category.clone(),
        }
    }

    /// Day partition directory
    pub fn day_dir(&self) -> &Path {
        &self.day_dir
    }

    /// Per-unit snapshot file
    pub fn snapshot(&self) -> PathBuf {
        self.day_dir.join(format!("{}.json", self.category))
    }

    /// Append-only stream file
    pub fn stream(&self) -> PathBuf {
        self.day_dir.join(format!("{}.jsonl", self.category))
    }
}

/// Parse a day partition directory name (`YYYYMMDD`)
///
/// Returns `None` for anything that is not exactly a valid compact date.
pub fn parse_day_dir(name: &str) -> Option<NaiveDate> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(name, DAY_DIR_FORMAT).ok()
}
