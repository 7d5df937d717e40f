//! Snapshot persistence
//!
//! [`SnapshotSink`] exclusively owns the data tree: per-unit snapshot files,
//! append-only JSONL streams and retention pruning.

pub mod path;
pub mod sink;

pub use path::{parse_day_dir, SnapshotPaths};
pub use sink::{SnapshotPack, SnapshotSink};

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
