//! Run command: one pass of the engine over the record store.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ct_core::{
    EngineConfig, RecordStateRepository, RecordStore, RunOptions, RunReport, run_pipeline,
};

/// Runs the pipeline and prints a one-line summary, or the full report as JSON.
pub fn run<W: Write, S: RecordStore>(
    writer: &mut W,
    store: &S,
    engine: &EngineConfig,
    reason: Option<&str>,
    now: DateTime<Utc>,
    options: RunOptions,
    json: bool,
) -> Result<RunReport> {
    let state_repo = RecordStateRepository::new(store, &engine.properties, &engine.state_title);
    let report = run_pipeline(store, &state_repo, engine, reason, now, options)
        .context("cycle calculation failed")?;

    if json {
        let out = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        writeln!(writer, "{out}")?;
    } else {
        writeln!(writer, "{}", summary(&report, engine, options.dry_run))?;
    }
    Ok(report)
}

fn summary(report: &RunReport, engine: &EngineConfig, dry_run: bool) -> String {
    if report.debounced {
        return format!(
            "Debounced: triggered again within {}s of the previous run",
            engine.min_trigger_interval_secs
        );
    }
    let verb = if dry_run { "Would write" } else { "Wrote" };
    let mut line = format!(
        "{verb} {} update(s) over {} record(s) ({} starts, {} ends)",
        report.writes, report.events, report.starts, report.ends
    );
    if report.created > 0 {
        line.push_str(&format!(", {} plan record(s) created", report.created));
    }
    if let Some(prediction) = &report.prediction {
        line.push_str(&format!("; next period {}", prediction.next_period));
    }
    line
}
