//! Data-quality flags and latest-of-metric markers.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::event::Event;
use crate::event_kind::EventKind;
use crate::pairing::Pair;
use crate::stats::CycleStats;
use crate::types::RecordId;

/// Records sharing a kind and date with another effective record.
pub fn duplicates(effective: &[Event]) -> BTreeSet<RecordId> {
    let mut groups: HashMap<(EventKind, NaiveDate), Vec<&RecordId>> = HashMap::new();
    for event in effective {
        groups
            .entry((event.kind, event.date))
            .or_default()
            .push(&event.id);
    }
    let flagged: BTreeSet<RecordId> = groups
        .into_values()
        .filter(|ids| ids.len() > 1)
        .flatten()
        .cloned()
        .collect();
    if !flagged.is_empty() {
        tracing::warn!(count = flagged.len(), "duplicate records share a kind and date");
    }
    flagged
}

/// Ends matched to a Start dated after them.
///
/// Pairing never produces this; it can only come from a corrupted window.
pub fn order_errors(pairs: &[Pair<'_>]) -> BTreeSet<RecordId> {
    pairs
        .iter()
        .filter_map(|p| p.end.filter(|end| end.date < p.start.date))
        .map(|end| {
            tracing::warn!(record = %end.id, "end dated before its start");
            end.id.clone()
        })
        .collect()
}

/// The single record carrying each "latest" marker, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LatestFlags {
    pub start: Option<RecordId>,
    pub end: Option<RecordId>,
    /// Most recent Start with a known cycle length.
    pub cycle: Option<RecordId>,
    /// Most recent End with a bleed length.
    pub bleed: Option<RecordId>,
    /// The latest Start, when the cycle average is known.
    pub avg_cycle: Option<RecordId>,
    /// The latest End, when the bleed average is known.
    pub avg_bleed: Option<RecordId>,
}

/// Picks the latest-of-metric records from the effective history.
pub fn latest_flags(starts: &[&Event], ends: &[&Event], stats: &CycleStats) -> LatestFlags {
    let start = starts.last().map(|s| s.id.clone());
    let end = ends.last().map(|e| e.id.clone());
    let cycle = starts
        .iter()
        .zip(&stats.cycle_days)
        .rev()
        .find(|(_, days)| **days > 0)
        .map(|(s, _)| s.id.clone());
    let bleed = ends
        .iter()
        .rev()
        .find(|e| stats.bleed_days.get(&e.id).is_some_and(|d| *d > 0))
        .map(|e| e.id.clone());

    LatestFlags {
        avg_cycle: start.clone().filter(|_| stats.avg_cycle > 0),
        avg_bleed: end.clone().filter(|_| stats.avg_bleed > 0),
        start,
        end,
        cycle,
        bleed,
    }
}
