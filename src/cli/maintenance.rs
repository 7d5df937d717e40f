//! Prune and status subcommands

use super::{Cli, CliError, OutputFormat};
use crate::metrics::record_pruned;
use crate::output::SnapshotSink;
use crate::resume::CompletionStore;
use chrono::{NaiveDate, Utc};
use clap::Args;
use tracing::info;

/// Arguments for the prune command
#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Keep day partitions newer than this many days
    #[arg(long, env = "RETAIN_DAYS", default_value_t = 7)]
    pub retain_days: u32,

    /// Reference day for the horizon (default: today, UTC)
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

impl PruneArgs {
    /// Execute the prune command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let sink = SnapshotSink::new(&cli.data_dir);
        let removed = sink.prune_older_than(self.retain_days, today)?;
        record_pruned(removed as u64);
        info!(removed, retain_days = self.retain_days, "Prune finished");

        match cli.output_format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({
                    "data_dir": cli.data_dir.display().to_string(),
                    "retain_days": self.retain_days,
                    "removed": removed,
                })
            ),
            OutputFormat::Human => println!("Removed {removed} day partition(s)"),
        }
        Ok(())
    }
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show ledgers for this symbol
    #[arg(long)]
    pub symbol: Option<String>,
}

impl StatusArgs {
    /// Execute the status command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let state_dir = cli.resolved_state_dir();
        let summaries: Vec<_> = CompletionStore::scan(&state_dir)?
            .into_iter()
            .filter(|s| self.symbol.as_deref().map_or(true, |symbol| s.symbol == symbol))
            .collect();

        match cli.output_format {
            OutputFormat::Json => {
                let ledgers: Vec<_> = summaries
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "symbol": s.symbol,
                            "interval": s.interval.to_string(),
                            "ok": s.tally.ok,
                            "failed": s.tally.failed,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "state_dir": state_dir.display().to_string(),
                        "ledgers": ledgers,
                    })
                );
            }
            OutputFormat::Human => {
                if summaries.is_empty() {
                    println!("No completion state under {}", state_dir.display());
                }
                for s in &summaries {
                    println!(
                        "{:<24} {:<8} ok={:<8} failed={}",
                        s.symbol, s.interval, s.tally.ok, s.tally.failed
                    );
                }
            }
        }
        Ok(())
    }
}
