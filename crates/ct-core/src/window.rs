//! Incremental recomputation window.
//!
//! A Start's cycle length depends on the nearest End before it, and that End
//! may sit just before the earliest edited record. Recomputing from one Start
//! before the first edited Start covers that dependency without touching the
//! rest of history. An edit dated after every Start can have moved an End out
//! from under any of them, so it recomputes everything.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use crate::event::Event;
use crate::record::Record;

/// Which suffix of the history gets fresh values on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Window {
    /// No checkpoint yet: everything is recomputed.
    Full,
    /// Nothing was edited since the checkpoint.
    Empty,
    /// Starts from `first_start` on, and Ends dated on or after `boundary`.
    Suffix {
        first_start: usize,
        boundary: NaiveDate,
    },
}

impl Window {
    /// The windowed suffix of the full ascending Start sequence.
    pub fn starts<'s, 'e>(&self, starts: &'s [&'e Event]) -> &'s [&'e Event] {
        match self {
            Self::Full => starts,
            Self::Empty => &[],
            Self::Suffix { first_start, .. } => starts.get(*first_start..).unwrap_or(&[]),
        }
    }

    /// The windowed Ends: every End on or after the boundary, with no upper bound.
    pub fn ends<'e>(&self, ends: &[&'e Event]) -> Vec<&'e Event> {
        match self {
            Self::Full => ends.to_vec(),
            Self::Empty => Vec::new(),
            Self::Suffix { boundary, .. } => {
                ends.iter().copied().filter(|e| e.date >= *boundary).collect()
            }
        }
    }

    /// Whether the Start at `index` of the full sequence is recomputed.
    pub const fn contains_start(&self, index: usize) -> bool {
        match self {
            Self::Full => true,
            Self::Empty => false,
            Self::Suffix { first_start, .. } => index >= *first_start,
        }
    }

    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Earliest date among dated records edited strictly after the checkpoint.
///
/// Kind is ignored: a record edited into noise still moves the window.
pub fn earliest_edited<'r>(
    records: impl IntoIterator<Item = &'r Record>,
    date_property: &str,
    offset: FixedOffset,
    checkpoint: DateTime<Utc>,
) -> Option<NaiveDate> {
    records
        .into_iter()
        .filter(|r| r.last_edited_at > checkpoint)
        .filter_map(|r| r.date(date_property).ok().flatten())
        .map(|d| d.day_in(offset))
        .min()
}

/// Selects the recomputation window.
///
/// `starts` is the full ascending Start sequence of the effective history;
/// `records` are scanned for edit times.
pub fn select<'r>(
    starts: &[&Event],
    records: impl IntoIterator<Item = &'r Record>,
    date_property: &str,
    offset: FixedOffset,
    last_calculated_at: Option<DateTime<Utc>>,
) -> Window {
    let Some(checkpoint) = last_calculated_at else {
        return Window::Full;
    };
    let Some(earliest) = earliest_edited(records, date_property, offset, checkpoint) else {
        return Window::Empty;
    };

    let first_at_or_after = starts.partition_point(|s| s.date < earliest);
    let window = if first_at_or_after == starts.len() {
        Window::Full
    } else {
        let first_start = first_at_or_after.saturating_sub(1);
        Window::Suffix {
            first_start,
            boundary: starts[first_start].date,
        }
    };

    tracing::debug!(%earliest, ?window, "selected recomputation window");
    window
}
