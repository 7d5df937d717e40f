//! Directory-backed completion store
//!
//! Layout: `<root>/<symbol>/<interval>.json`, one [`CompletionLedger`] per
//! (symbol, interval). Ledgers are loaded lazily and every `set` rewrites
//! the whole file atomically before returning.

use super::state::{CompletionLedger, CompletionRecord, ResumeError, StoreTally, UnitStatus};
use crate::{Interval, MarketSymbol, UnitKey};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Durable per-unit completion state
#[derive(Debug)]
pub struct CompletionStore {
    root: PathBuf,
    ledgers: HashMap<(MarketSymbol, Interval), CompletionLedger>,
}

/// Summary of one ledger file, for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSummary {
    /// Symbol directory name
    pub symbol: String,
    /// Interval
    pub interval: Interval,
    /// Outcome counts
    pub tally: StoreTally,
}

impl CompletionStore {
    /// Open (and create if missing) a store rooted at `root`
    ///
    /// # Errors
    /// Fails if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ResumeError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            ResumeError::IoError(format!("Failed to create {}: {e}", root.display()))
        })?;
        debug!(root = %root.display(), "Opened completion store");
        Ok(Self {
            root,
            ledgers: HashMap::new(),
        })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ledger path for a (symbol, interval) pair
    pub fn ledger_path(&self, symbol: &MarketSymbol, interval: Interval) -> PathBuf {
        self.root
            .join(symbol.as_str())
            .join(format!("{}.json", interval.as_str()))
    }

    fn ledger(
        &mut self,
        symbol: &MarketSymbol,
        interval: Interval,
    ) -> Result<&mut CompletionLedger, ResumeError> {
        let path = self.ledger_path(symbol, interval);
        match self.ledgers.entry((symbol.clone(), interval)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let ledger = if path.exists() {
                    let ledger = CompletionLedger::load(&path)?;
                    if ledger.symbol() != symbol.as_str() || ledger.interval() != interval {
                        return Err(ResumeError::LedgerMismatch {
                            path: path.display().to_string(),
                            expected: format!("{symbol}/{interval}"),
                            found: format!("{}/{}", ledger.symbol(), ledger.interval()),
                        });
                    }
                    info!(
                        symbol = %symbol,
                        interval = %interval,
                        entries = ledger.entries().len(),
                        "Loaded completion ledger"
                    );
                    ledger
                } else {
                    CompletionLedger::new(symbol.as_str(), interval)
                };
                Ok(entry.insert(ledger))
            }
        }
    }

    /// Stored outcome for a unit, if any
    pub fn get(&mut self, key: &UnitKey) -> Result<Option<CompletionRecord>, ResumeError> {
        let entry = key.entry_name();
        Ok(self
            .ledger(&key.symbol, key.interval)?
            .get(&entry)
            .cloned())
    }

    /// Record a terminal outcome and flush the ledger to disk
    pub fn set(&mut self, key: &UnitKey, status: UnitStatus) -> Result<(), ResumeError> {
        let path = self.ledger_path(&key.symbol, key.interval);
        let ledger = self.ledger(&key.symbol, key.interval)?;
        ledger.set(key.entry_name(), status);
        ledger.save(&path)
    }

    /// Outcome counts for one (symbol, interval) pair
    pub fn tally(
        &mut self,
        symbol: &MarketSymbol,
        interval: Interval,
    ) -> Result<StoreTally, ResumeError> {
        Ok(self.ledger(symbol, interval)?.tally())
    }

    /// Summarize every ledger under `root`, sorted by symbol then interval
    ///
    /// Files whose stem is not a known interval are ignored.
    pub fn scan(root: &Path) -> Result<Vec<LedgerSummary>, ResumeError> {
        let mut summaries = Vec::new();
        if !root.exists() {
            return Ok(summaries);
        }

        for symbol_dir in read_dir(root)? {
            if !symbol_dir.is_dir() {
                continue;
            }
            for file in read_dir(&symbol_dir)? {
                if file.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(interval) = file
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<Interval>().ok())
                else {
                    continue;
                };
                let ledger = CompletionLedger::load(&file)?;
                summaries.push(LedgerSummary {
                    symbol: ledger.symbol().to_string(),
                    interval,
                    tally: ledger.tally(),
                });
            }
        }

        summaries.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.interval.cmp(&b.interval)));
        Ok(summaries)
    }
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, ResumeError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ResumeError::IoError(format!("Failed to read {}: {e}", dir.display())))?;
    entries
        .map(|entry| {
            entry
                .map(|e| e.path())
                .map_err(|e| ResumeError::IoError(e.to_string()))
        })
        .collect()
}
