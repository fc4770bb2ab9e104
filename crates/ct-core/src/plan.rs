//! Desired field values per record, and the writes needed to reach them.
//!
//! Every run plans the complete final state of the fields the engine owns:
//! titles and flags for every classified record, statistics for windowed
//! records. Only fields whose stored value differs are written, so a run over
//! unchanged data issues no writes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::FixedOffset;

use crate::config::EngineConfig;
use crate::event::Event;
use crate::pairing::Pair;
use crate::quality::LatestFlags;
use crate::record::{Fields, Record};
use crate::stats::CycleStats;
use crate::title::title_for;
use crate::types::RecordId;
use crate::window::Window;

/// A partial update for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub id: RecordId,
    pub fields: Fields,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePlan {
    desired: BTreeMap<RecordId, Fields>,
}

impl UpdatePlan {
    /// Adds fields for a record. Later values for the same field win.
    pub fn set(&mut self, id: &RecordId, fields: Fields) {
        self.desired.entry(id.clone()).or_default().merge(fields);
    }

    pub fn get(&self, id: &RecordId) -> Option<&Fields> {
        self.desired.get(id)
    }

    /// Number of records with planned fields.
    pub fn len(&self) -> usize {
        self.desired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }

    /// The writes needed to bring `records` to the planned state, in store order.
    pub fn changes(mut self, records: &[Record]) -> Vec<RecordUpdate> {
        records
            .iter()
            .filter_map(|record| {
                let fields = self.desired.remove(&record.id)?.changed_from(record);
                (!fields.is_empty()).then(|| RecordUpdate {
                    id: record.id.clone(),
                    fields,
                })
            })
            .collect()
    }
}

/// Everything the planner reads from earlier stages.
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs<'a> {
    /// Every classified event, violators included.
    pub events: &'a [Event],
    /// Effective Starts, ascending.
    pub starts: &'a [&'a Event],
    pub window: Window,
    pub windowed_pairs: &'a [Pair<'a>],
    pub windowed_ends: &'a [&'a Event],
    pub stats: &'a CycleStats,
    pub violations: &'a BTreeSet<RecordId>,
    pub input_errors: &'a BTreeSet<RecordId>,
    pub latest: &'a LatestFlags,
}

/// Builds the plan for one run.
pub fn build(inputs: &PlanInputs<'_>, config: &EngineConfig, offset: FixedOffset) -> UpdatePlan {
    let names = &config.properties;
    let stats = inputs.stats;
    let latest = inputs.latest;
    let mut plan = UpdatePlan::default();

    let is = |flag: &Option<RecordId>, id: &RecordId| flag.as_ref() == Some(id);
    for event in inputs.events {
        let id = &event.id;
        plan.set(
            id,
            Fields::new()
                .title(&names.title, title_for(event, config, offset))
                .checkbox(&names.template_error, inputs.violations.contains(id))
                .checkbox(&names.input_error, inputs.input_errors.contains(id))
                .checkbox(&names.latest_start, is(&latest.start, id))
                .checkbox(&names.latest_end, is(&latest.end, id))
                .checkbox(&names.latest_cycle, is(&latest.cycle, id))
                .checkbox(&names.latest_bleed, is(&latest.bleed, id))
                .checkbox(&names.latest_avg_cycle, is(&latest.avg_cycle, id))
                .checkbox(&names.latest_avg_bleed, is(&latest.avg_bleed, id)),
        );
    }

    for (i, start) in inputs.starts.iter().enumerate() {
        if !inputs.window.contains_start(i) {
            continue;
        }
        let cycle = stats.cycle_days.get(i).copied().unwrap_or(0);
        plan.set(
            &start.id,
            Fields::new()
                .count(&names.cycle_days, cycle)
                .count(&names.avg_cycle, stats.display_avg_cycle)
                .count(&names.bleed_days, 0)
                .count(&names.avg_bleed, 0)
                .day(&names.next_period, None)
                .day(&names.ovulation, None),
        );
    }

    // Written even when nothing was edited, after the clears above.
    if let Some(prediction) = &stats.prediction {
        plan.set(
            &prediction.start,
            Fields::new()
                .day(&names.next_period, Some(prediction.next_period))
                .day(&names.ovulation, Some(prediction.ovulation)),
        );
    }

    for end in inputs.windowed_ends {
        plan.set(
            &end.id,
            Fields::new()
                .count(&names.bleed_days, 0)
                .count(&names.avg_bleed, 0),
        );
    }
    for pair in inputs.windowed_pairs {
        let Some(end) = pair.end else { continue };
        let bleed = stats
            .bleed_days
            .get(&end.id)
            .copied()
            .or_else(|| pair.bleed_days())
            .unwrap_or(1);
        plan.set(
            &end.id,
            Fields::new()
                .count(&names.bleed_days, bleed)
                .count(&names.avg_bleed, stats.avg_bleed)
                .day(&names.next_period, None)
                .day(&names.ovulation, None),
        );
    }

    tracing::debug!(records = plan.len(), "planned field values");
    plan
}
