//! Cycle statistics and forward predictions.
//!
//! All values are computed over the effective history; the window only
//! decides which records receive them.

use std::collections::HashMap;

use chrono::{NaiveDate, TimeDelta};
use serde::Serialize;

use crate::config::{AveragingStrategy, EngineConfig};
use crate::event::Event;
use crate::pairing::Pair;
use crate::types::RecordId;

/// Days from the previous End to a Start, or 0 when there is no previous End.
///
/// Zero means "unknown" and is never averaged.
pub fn cycle_length(start: &Event, previous_end: Option<&Event>) -> i64 {
    previous_end.map_or(0, |end| (start.date - end.date).num_days().max(0))
}

/// Arithmetic mean rounded half up.
pub fn round_mean(values: &[i64]) -> Option<i64> {
    let n = i64::try_from(values.len()).ok().filter(|n| *n > 0)?;
    let sum: i64 = values.iter().sum();
    Some((2 * sum + n).div_euclid(2 * n))
}

/// Rolling cycle average under the configured strategy, 0 when no value qualifies.
///
/// `cycles` must be in chronological order.
pub fn rolling_cycle_average(cycles: &[i64], strategy: AveragingStrategy) -> i64 {
    let known = cycles.iter().copied().filter(|c| *c > 0);
    let values: Vec<i64> = match strategy {
        AveragingStrategy::FullHistory => known.collect(),
        AveragingStrategy::Trailing {
            min_days,
            max_days,
            window,
        } => {
            let bounded: Vec<i64> = known.filter(|c| (min_days..=max_days).contains(c)).collect();
            let skip = bounded.len().saturating_sub(window);
            bounded[skip..].to_vec()
        }
    };
    round_mean(&values).unwrap_or(0)
}

/// Next period and ovulation dates projected from the latest Start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prediction {
    /// The latest Start the projection is anchored on.
    pub start: RecordId,
    pub next_period: NaiveDate,
    pub ovulation: NaiveDate,
}

pub fn predict(
    start: &Event,
    base_cycle_days: i64,
    luteal_days: i64,
) -> Option<Prediction> {
    let next_period = start
        .date
        .checked_add_signed(TimeDelta::try_days(base_cycle_days)?)?;
    let ovulation = next_period.checked_sub_signed(TimeDelta::try_days(luteal_days)?)?;
    Some(Prediction {
        start: start.id.clone(),
        next_period,
        ovulation,
    })
}

/// Statistics over the whole effective history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    /// Cycle length per Start, aligned with the Start sequence.
    pub cycle_days: Vec<i64>,
    /// Bleed length per matched End.
    pub bleed_days: HashMap<RecordId, i64>,
    /// Rounded average cycle, 0 when unknown.
    pub avg_cycle: i64,
    /// Average cycle as written to records: the default replaces 0.
    pub display_avg_cycle: i64,
    /// Cycle length used for prediction: the default replaces 0.
    pub prediction_base: i64,
    /// Rounded average bleed over every matched pair, 0 when none.
    pub avg_bleed: i64,
    pub prediction: Option<Prediction>,
}

/// Computes statistics for the effective history.
///
/// `previous_ends` is aligned with `starts` (see [`crate::pairing::previous_ends`]);
/// `pairs` is the pairing of the full effective history.
pub fn compute(
    starts: &[&Event],
    previous_ends: &[Option<&Event>],
    pairs: &[Pair<'_>],
    config: &EngineConfig,
) -> CycleStats {
    let cycle_days: Vec<i64> = starts
        .iter()
        .zip(previous_ends)
        .map(|(start, prev)| cycle_length(start, *prev))
        .collect();
    let avg_cycle = rolling_cycle_average(&cycle_days, config.averaging);

    let mut bleed_days = HashMap::new();
    let mut bleeds = Vec::new();
    for p in pairs {
        if let (Some(end), Some(days)) = (p.end, p.bleed_days()) {
            bleed_days.insert(end.id.clone(), days);
            bleeds.push(days);
        }
    }
    let avg_bleed = round_mean(&bleeds).unwrap_or(0);

    let fallback = |avg: i64| if avg > 0 { avg } else { config.default_cycle_days };
    let display_avg_cycle = fallback(avg_cycle);
    let prediction_base = fallback(avg_cycle);
    let prediction = starts
        .last()
        .and_then(|last| predict(last, prediction_base, config.luteal_days));

    tracing::debug!(
        starts = starts.len(),
        matched = bleeds.len(),
        avg_cycle,
        avg_bleed,
        "computed cycle statistics"
    );

    CycleStats {
        cycle_days,
        bleed_days,
        avg_cycle,
        display_avg_cycle,
        prediction_base,
        avg_bleed,
        prediction,
    }
}
