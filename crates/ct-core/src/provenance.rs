//! Authorship checks: who is expected to create each kind of record.

use std::collections::BTreeSet;

use crate::event::Event;
use crate::event_kind::EventKind;
use crate::types::{Author, RecordId};

/// The author a record of this kind should have, if any is required.
pub const fn expected_author(kind: EventKind) -> Option<Author> {
    match kind {
        EventKind::Start | EventKind::End => Some(Author::Person),
        EventKind::PlannedPeriod | EventKind::PlannedOvulation => Some(Author::Automation),
        EventKind::DailyNote => None,
    }
}

pub fn is_violation(event: &Event) -> bool {
    expected_author(event.kind).is_some_and(|expected| expected != event.created_by)
}

/// Result of checking a classified history.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceCheck {
    /// Records whose author does not match their kind.
    pub violations: BTreeSet<RecordId>,
    /// Events that take part in pairing, averaging, and prediction.
    pub effective: Vec<Event>,
}

/// Flags provenance violations and derives the effective event set.
///
/// In strict mode violators are left out of the effective set. They stay in
/// the caller's full history, which the previous-end lookup still reads.
pub fn check(events: &[Event], strict: bool) -> ProvenanceCheck {
    let violations: BTreeSet<RecordId> = events
        .iter()
        .filter(|e| is_violation(e))
        .map(|e| e.id.clone())
        .collect();

    for id in &violations {
        tracing::warn!(record = %id, "record author does not match its kind");
    }

    let effective = events
        .iter()
        .filter(|e| !strict || !violations.contains(&e.id))
        .cloned()
        .collect();

    ProvenanceCheck {
        violations,
        effective,
    }
}
