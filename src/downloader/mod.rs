//! Export orchestration
//!
//! This module turns an [`ExportRequest`] into work units and drives them
//! through the upstream client into the snapshot sink, recording every
//! terminal outcome in the completion store.
//!
//! # Overview
//!
//! 1. **Request**: symbols × intervals × days × categories, validated up front
//! 2. **Enumeration**: [`units::WorkUnitEnumerator`] yields units in a fixed order
//! 3. **Execution**: [`executor::ExportScheduler`] paces, fetches, persists
//! 4. **Resume**: units already `ok` (or with a snapshot on disk) are skipped
//!
//! # Components
//!
//! - [`executor`] - The scheduler and run summary
//! - [`units`] - Requests, units and enumeration
//! - [`config`] - Pacing jitter, retention and failed-unit policy
//! - [`progress`] - Throttled progress reporting
//!
//! # Error Handling
//!
//! `run` only fails on setup problems (invalid request, unusable state
//! directory). Per-unit failures are recorded as `error:<reason>` and counted
//! in the [`ExportSummary`].

pub mod config;
pub mod executor;
pub mod progress;
pub mod units;

pub use config::{FailedUnitPolicy, RetentionPolicy};
pub use executor::{ExportScheduler, ExportSummary, UnitFailure};
pub use progress::{ProgressState, ProgressTracker};
pub use units::{ExportRequest, WorkUnit, WorkUnitEnumerator};

use crate::output::OutputError;
use crate::resume::ResumeError;

/// Export setup errors
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Request failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Completion store unusable
    #[error("state error: {0}")]
    State(#[from] ResumeError),

    /// Data tree unusable
    #[error("output error: {0}")]
    Output(#[from] OutputError),
}
