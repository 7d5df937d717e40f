//! CLI command implementations

pub mod error;
pub mod export;
pub mod maintenance;

pub use error::CliError;
pub use export::ExportArgs;
pub use maintenance::{PruneArgs, StatusArgs};

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// Coinalyze history exporter CLI
#[derive(Parser, Debug)]
#[command(name = "coinalyze-exporter")]
#[command(about = "Resumable, rate-limited export of Coinalyze history data", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format for command results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Data root directory for snapshot files and streams
    #[arg(long, global = true, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Completion state directory (default: `state` next to the data directory)
    #[arg(long, global = true, env = "STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl Cli {
    /// Effective completion state directory
    pub fn resolved_state_dir(&self) -> PathBuf {
        match &self.state_dir {
            Some(dir) => dir.clone(),
            None => default_state_dir(&self.data_dir),
        }
    }
}

/// `<data_dir>/../state`
pub fn default_state_dir(data_dir: &Path) -> PathBuf {
    data_dir
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("state")
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export history for symbols × intervals × days × categories
    Export(ExportArgs),

    /// Remove day partitions older than the retention horizon
    Prune(PruneArgs),

    /// Summarize recorded unit outcomes
    Status(StatusArgs),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}
