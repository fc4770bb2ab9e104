//! Add command: insert a human-authored record into the local database.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use ct_core::{Author, EngineConfig, EventKind, Fields, Record, title};
use ct_db::Database;

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    engine: &EngineConfig,
    kind: EventKind,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Record> {
    let names = &engine.properties;
    let offset = engine
        .reference_offset()
        .context("invalid engine configuration")?;
    let title = title::compose(kind, date, now, engine, offset);
    let fields = Fields::new()
        .title(&names.title, title.as_str())
        .select(&names.kind, Some(engine.kinds.label(kind)))
        .day(&names.date, Some(date));

    let record = db
        .insert_record_at(&fields, Author::Person, now)
        .context("failed to insert record")?;
    tracing::debug!(id = %record.id, %kind, %date, "added record");

    writeln!(writer, "Added {title} ({})", record.id)?;
    Ok(record)
}
