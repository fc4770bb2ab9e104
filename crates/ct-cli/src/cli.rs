//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ct_core::EventKind;

/// Cycle tracker.
///
/// Pairs period Start and End records, computes cycle statistics, and writes
/// predictions back to the record store.
#[derive(Debug, Parser)]
#[command(name = "ct", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Recompute statistics and write them back to the store.
    Run {
        /// Why the run was triggered (e.g. a webhook event). Enables debouncing.
        #[arg(long, env = "CT_EVENT_REASON")]
        reason: Option<String>,

        /// Ignore the checkpoint and recompute every record.
        #[arg(long)]
        full: bool,

        /// Compute everything but write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show checkpoints and current statistics without writing.
    Status,

    /// Add a record to the local database.
    Add {
        /// Record kind: start, end, planned_period, planned_ovulation, daily_note.
        kind: EventKind,

        /// Calendar day (YYYY-MM-DD).
        date: NaiveDate,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::parse_from(["ct", "run", "--reason", "page.updated", "--full"]);
        match cli.command {
            Some(Commands::Run {
                reason,
                full,
                dry_run,
                json,
            }) => {
                assert_eq!(reason.as_deref(), Some("page.updated"));
                assert!(full);
                assert!(!dry_run);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn add_parses_kind_and_date() {
        let cli = Cli::parse_from(["ct", "add", "start", "2025-01-29"]);
        match cli.command {
            Some(Commands::Add { kind, date }) => {
                assert_eq!(kind, EventKind::Start);
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 1, 29).unwrap());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn add_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["ct", "add", "spotting", "2025-01-29"]).is_err());
    }
}
