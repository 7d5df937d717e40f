//! CLI error types and conversions

use crate::downloader::ExportError;
use crate::fetcher::FetcherError;
use crate::notify::NotifyError;
use crate::output::OutputError;
use crate::registry::RegistryError;
use crate::resume::ResumeError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Registry error
    #[error("registry error: {0}")]
    RegistryError(#[from] RegistryError),

    /// Export error
    #[error("export error: {0}")]
    ExportError(#[from] ExportError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Notifier setup error
    #[error("notify error: {0}")]
    NotifyError(#[from] NotifyError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
