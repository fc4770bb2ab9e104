//! Status command for showing checkpoints and current statistics.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use ct_core::{EngineConfig, RecordStateRepository, RecordStore, RunOptions, run_pipeline};

/// Prints checkpoints and statistics computed read-only from `store`.
///
/// `location` names the backend in the output.
pub fn run<W: Write, S: RecordStore>(
    writer: &mut W,
    store: &S,
    engine: &EngineConfig,
    location: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let state_repo = RecordStateRepository::new(store, &engine.properties, &engine.state_title);
    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let report = run_pipeline(store, &state_repo, engine, None, now, options)
        .context("failed to compute statistics")?;

    writeln!(writer, "Cycle tracker status")?;
    writeln!(writer, "Store: {location}")?;
    writeln!(writer, "Last calculated: {}", checkpoint(report.last_calculated_at))?;
    writeln!(writer, "Last triggered: {}", checkpoint(report.last_triggered_at))?;

    if report.events == 0 {
        writeln!(writer, "No events recorded.")?;
        return Ok(());
    }

    writeln!(
        writer,
        "Records: {} ({} starts, {} ends)",
        report.events, report.starts, report.ends
    )?;
    writeln!(writer, "Average cycle: {} days", report.display_avg_cycle)?;
    writeln!(writer, "Average period: {} days", report.avg_bleed)?;
    if let Some(prediction) = &report.prediction {
        writeln!(writer, "Next period: {}", prediction.next_period)?;
        writeln!(writer, "Ovulation: {}", prediction.ovulation)?;
    }
    writeln!(
        writer,
        "Flags: {} provenance, {} duplicate, {} ordering",
        report.violations, report.duplicates, report.order_errors
    )?;
    writeln!(writer, "Pending updates: {}", report.writes)?;

    Ok(())
}

fn checkpoint(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "never".to_string(),
        |at| at.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}
