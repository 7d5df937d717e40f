//! Resume capability for export runs
//!
//! Provides durable per-unit completion state with atomic writes and file locking.

pub mod state;
pub mod store;

pub use state::{
    CompletionLedger, CompletionRecord, ResumeError, StoreTally, UnitStatus, MAX_STATE_FILE_SIZE,
};
pub use store::{CompletionStore, LedgerSummary};
