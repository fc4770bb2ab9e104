//! Start/End pairing.
//!
//! # Algorithm
//!
//! Starts and Ends are walked together with a single cursor over the Ends.
//! For each Start, Ends dated before it are skipped (they close an earlier
//! episode or are orphans). The first remaining End dated before the next
//! Start is matched and consumed. Each End is therefore matched at most once,
//! always to the earliest Start whose window contains it.

use crate::event::Event;

/// A Start and the End matched to it, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair<'a> {
    pub start: &'a Event,
    pub end: Option<&'a Event>,
}

impl Pair<'_> {
    /// Inclusive day count of the episode, at least one day.
    pub fn bleed_days(&self) -> Option<i64> {
        self.end
            .map(|end| ((end.date - self.start.date).num_days() + 1).max(1))
    }
}

/// Pairs ascending Starts with ascending Ends.
pub fn pair<'a>(starts: &[&'a Event], ends: &[&'a Event]) -> Vec<Pair<'a>> {
    let mut pairs = Vec::with_capacity(starts.len());
    let mut cursor = 0;
    for (i, start) in starts.iter().enumerate() {
        let next_start = starts.get(i + 1).map(|s| s.date);
        while cursor < ends.len() && ends[cursor].date < start.date {
            cursor += 1;
        }
        let end = match ends.get(cursor) {
            Some(end) if next_start.is_none_or(|next| end.date < next) => {
                cursor += 1;
                Some(*end)
            }
            _ => None,
        };
        pairs.push(Pair { start, end });
    }
    pairs
}

/// For each Start, the nearest End dated strictly before it.
///
/// The result is aligned with `starts`. Callers pass the full End history,
/// not a windowed suffix, so the relation stays correct for recomputed Starts.
pub fn previous_ends<'a>(starts: &[&Event], ends: &[&'a Event]) -> Vec<Option<&'a Event>> {
    let mut result = Vec::with_capacity(starts.len());
    let mut last_before = None;
    let mut cursor = 0;
    for start in starts {
        while cursor < ends.len() && ends[cursor].date < start.date {
            last_before = Some(ends[cursor]);
            cursor += 1;
        }
        result.push(last_before);
    }
    result
}
