//! Typed events classified from raw store records.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use crate::config::PropertyNames;
use crate::event_kind::{EventKind, KindLabels};
use crate::record::{PropertyError, Record};
use crate::types::{Author, RecordId};

/// One classified record of the cycle log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: RecordId,
    pub kind: EventKind,
    /// The event's day in the reference timezone.
    pub date: NaiveDate,
    pub created_by: Author,
    pub created_at: DateTime<Utc>,
    pub last_edited_at: DateTime<Utc>,
}

/// Reads an optional property, treating a property the record lacks as unset.
fn optional<T>(value: Result<Option<T>, PropertyError>) -> Result<Option<T>, PropertyError> {
    match value {
        Err(PropertyError::Missing { .. }) => Ok(None),
        other => other,
    }
}

/// Classifies records into events sorted ascending by date.
///
/// Records without a recognized kind or a usable date are dropped without
/// error. Ties keep the store's order. A property of the wrong type means
/// the property names are misconfigured and is returned as an error.
pub fn classify(
    records: &[Record],
    names: &PropertyNames,
    labels: &KindLabels,
    offset: FixedOffset,
) -> Result<Vec<Event>, PropertyError> {
    let mut events = Vec::with_capacity(records.len());
    for record in records {
        let Some(kind) = optional(record.select(&names.kind))?.and_then(|l| labels.kind_of(l))
        else {
            continue;
        };
        let Some(date) = optional(record.date(&names.date))? else {
            continue;
        };
        events.push(Event {
            id: record.id.clone(),
            kind,
            date: date.day_in(offset),
            created_by: record.created_by,
            created_at: record.created_at,
            last_edited_at: record.last_edited_at,
        });
    }
    events.sort_by_key(|e| e.date);

    tracing::debug!(
        records = records.len(),
        events = events.len(),
        "classified records"
    );
    Ok(events)
}

/// Events of one kind, preserving order.
pub fn of_kind(events: &[Event], kind: EventKind) -> Vec<&Event> {
    events.iter().filter(|e| e.kind == kind).collect()
}
