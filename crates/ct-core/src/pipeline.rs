//! One invocation of the engine, end to end.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigError, EngineConfig};
use crate::debounce::{self, DebounceDecision};
use crate::event::{classify, of_kind};
use crate::event_kind::EventKind;
use crate::pairing::{pair, previous_ends};
use crate::plan::{self, PlanInputs};
use crate::provenance;
use crate::quality;
use crate::record::{Fields, Filter, PropertyError};
use crate::stats::{self, Prediction};
use crate::store::{RecordStore, StateRepository, StoreError};
use crate::title;
use crate::window::{self, Window};

/// Errors that abort a run. No checkpoint is written when one occurs.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid engine configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A configured property holds an unexpected type on some record.
    #[error("record schema does not match the configured properties: {0}")]
    Schema(#[from] PropertyError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Ignore the checkpoint and recompute every record.
    pub force_full: bool,
    /// Compute everything but write nothing, state included.
    pub dry_run: bool,
}

/// What a run saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub debounced: bool,
    /// Checkpoints as loaded at the start of the run.
    pub last_calculated_at: Option<DateTime<Utc>>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub window: Option<Window>,
    pub events: usize,
    pub starts: usize,
    pub ends: usize,
    /// Violators left out of the effective set.
    pub excluded: usize,
    pub avg_cycle: i64,
    pub display_avg_cycle: i64,
    pub avg_bleed: i64,
    pub prediction: Option<Prediction>,
    pub violations: usize,
    pub duplicates: usize,
    pub order_errors: usize,
    /// Record updates issued, or that would be issued in a dry run.
    pub writes: usize,
    /// Plan records created, or that would be created in a dry run.
    pub created: usize,
}

/// Runs the engine once.
///
/// Sequence: load state, debounce, record the trigger, fetch, classify,
/// check provenance, pair, select the window, compute statistics and
/// quality flags, write the diffed plan, upsert plan records, checkpoint.
/// `reason` is set when an external trigger started the run.
pub fn run_pipeline<S, R>(
    store: &S,
    state_repo: &R,
    config: &EngineConfig,
    reason: Option<&str>,
    now: DateTime<Utc>,
    options: RunOptions,
) -> Result<RunReport, PipelineError>
where
    S: RecordStore + ?Sized,
    R: StateRepository + ?Sized,
{
    config.validate()?;
    let offset = config.reference_offset()?;
    let names = &config.properties;

    let mut state = if options.dry_run {
        state_repo.find_state()?
    } else {
        Some(state_repo.load_or_create_state(now)?)
    };
    let mut report = RunReport {
        last_calculated_at: state.as_ref().and_then(|s| s.last_calculated_at),
        last_triggered_at: state.as_ref().and_then(|s| s.last_triggered_at),
        ..RunReport::default()
    };

    let decision = state.as_ref().map_or(DebounceDecision::Proceed, |s| {
        debounce::evaluate(s, reason, now, config.min_trigger_interval())
    });
    if !options.dry_run {
        if let Some(state) = state.as_mut() {
            state.last_triggered_at = Some(now);
            state_repo.save_last_triggered(state)?;
        }
    }
    if decision.is_suppressed() {
        report.debounced = true;
        return Ok(report);
    }

    let records = store.query_all(&names.date)?;
    let events = classify(&records, names, &config.kinds, offset)?;
    let checked = provenance::check(&events, config.strict_templates);

    let starts = of_kind(&checked.effective, EventKind::Start);
    let ends = of_kind(&checked.effective, EventKind::End);
    // Cycle lengths look back over every End, violators included.
    let all_ends = of_kind(&events, EventKind::End);
    let previous = previous_ends(&starts, &all_ends);
    let pairs = pair(&starts, &ends);

    let checkpoint = if options.force_full {
        None
    } else {
        report.last_calculated_at
    };
    // The state record is dated and touched on every run.
    let state_id = state.as_ref().map(|s| &s.id);
    let edited = records.iter().filter(|r| Some(&r.id) != state_id);
    let window = window::select(&starts, edited, &names.date, offset, checkpoint);
    let windowed_ends = window.ends(&ends);
    let windowed_pairs = pair(window.starts(&starts), &windowed_ends);

    let stats = stats::compute(&starts, &previous, &pairs, config);
    let duplicates = quality::duplicates(&checked.effective);
    let order_errors = quality::order_errors(&windowed_pairs);
    let input_errors: BTreeSet<_> = duplicates.union(&order_errors).cloned().collect();
    let latest = quality::latest_flags(&starts, &ends, &stats);

    let plan = plan::build(
        &PlanInputs {
            events: &events,
            starts: &starts,
            window,
            windowed_pairs: &windowed_pairs,
            windowed_ends: &windowed_ends,
            stats: &stats,
            violations: &checked.violations,
            input_errors: &input_errors,
            latest: &latest,
        },
        config,
        offset,
    );
    let changes = plan.changes(&records);
    if !options.dry_run {
        for change in &changes {
            store.update_record(&change.id, &change.fields)?;
        }
    }

    let created = match &stats.prediction {
        Some(prediction) if config.create_plan_records => {
            upsert_plan_records(store, config, prediction, now, options.dry_run)?
        }
        _ => 0,
    };

    if let Some(state) = state.as_mut().filter(|_| !options.dry_run) {
        state.last_calculated_at = Some(now);
        state_repo.save_last_calculated(state)?;
    }

    report.window = Some(window);
    report.events = events.len();
    report.starts = starts.len();
    report.ends = ends.len();
    report.excluded = events.len() - checked.effective.len();
    report.avg_cycle = stats.avg_cycle;
    report.display_avg_cycle = stats.display_avg_cycle;
    report.avg_bleed = stats.avg_bleed;
    report.prediction = stats.prediction.clone();
    report.violations = checked.violations.len();
    report.duplicates = duplicates.len();
    report.order_errors = order_errors.len();
    report.writes = changes.len();
    report.created = created;

    tracing::info!(
        ?window,
        events = report.events,
        writes = report.writes,
        created = report.created,
        dry_run = options.dry_run,
        "run complete"
    );
    Ok(report)
}

/// Creates planned-period and planned-ovulation records at the predicted
/// dates unless a record of that kind already exists on that date.
fn upsert_plan_records<S: RecordStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    prediction: &Prediction,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<usize, PipelineError> {
    let names = &config.properties;
    let offset = config.reference_offset()?;
    let mut created = 0;
    for (kind, date) in [
        (EventKind::PlannedPeriod, prediction.next_period),
        (EventKind::PlannedOvulation, prediction.ovulation),
    ] {
        let label = config.kinds.label(kind);
        let filter = Filter::And(vec![
            Filter::SelectEquals {
                property: names.kind.clone(),
                value: label.to_string(),
            },
            Filter::DateEquals {
                property: names.date.clone(),
                date,
            },
        ]);
        if !store.query_filtered(&filter)?.is_empty() {
            continue;
        }
        created += 1;
        if dry_run {
            continue;
        }
        let title = title::compose(kind, date, now, config, offset);
        let fields = Fields::new()
            .title(&names.title, title)
            .day(&names.date, Some(date))
            .select(&names.kind, Some(label));
        let record = store.create_record(&fields)?;
        tracing::info!(record = %record.id, %kind, %date, "created plan record");
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeDelta};

    use super::*;
    use crate::config::PropertyNames;
    use crate::record::Record;
    use crate::store::RecordStateRepository;
    use crate::test_support::{MemoryStore, at, day};
    use crate::types::{Author, RecordId};

    fn run(
        store: &MemoryStore,
        config: &EngineConfig,
        reason: Option<&str>,
        now: DateTime<Utc>,
        options: RunOptions,
    ) -> RunReport {
        let repo = RecordStateRepository::new(store, &config.properties, &config.state_title);
        run_pipeline(store, &repo, config, reason, now, options).unwrap()
    }

    fn number(record: &Record, name: &str) -> Option<f64> {
        record.number(name).ok().flatten()
    }

    fn flag(record: &Record, name: &str) -> bool {
        record.checkbox(name).unwrap_or(false)
    }

    fn next_period(record: &Record, names: &PropertyNames) -> Option<NaiveDate> {
        record
            .date(&names.next_period)
            .ok()
            .flatten()
            .map(|d| d.instant().date_naive())
    }

    #[test]
    fn first_run_pairs_and_predicts() {
        let config = EngineConfig::default();
        let names = &config.properties;
        let store = MemoryStore::new();
        let s1 = store.person(EventKind::Start, day(2024, 1, 1));
        let s2 = store.person(EventKind::Start, day(2024, 1, 29));
        let e1 = store.person(EventKind::End, day(2024, 1, 5));

        let report = run(&store, &config, None, at(2024, 2, 1, 0), RunOptions::default());
        assert_eq!(report.window, Some(Window::Full));
        assert_eq!((report.starts, report.ends), (2, 1));

        let e1 = store.get(&e1);
        assert_eq!(number(&e1, &names.bleed_days), Some(5.0));
        assert_eq!(number(&e1, &names.avg_bleed), Some(5.0));
        assert_eq!(
            e1.title(&names.title).unwrap(),
            Some("End / 01/05")
        );

        let s1 = store.get(&s1);
        assert_eq!(number(&s1, &names.cycle_days), Some(0.0));
        assert_eq!(next_period(&s1, names), None);

        let s2 = store.get(&s2);
        assert_eq!(number(&s2, &names.cycle_days), Some(24.0));
        assert_eq!(number(&s2, &names.avg_cycle), Some(24.0));
        assert_eq!(next_period(&s2, names), Some(day(2024, 2, 22)));
        assert!(flag(&s2, &names.latest_start));
        assert!(flag(&s2, &names.latest_cycle));
        assert!(!flag(&s1, &names.latest_start));

        let state = RecordStateRepository::new(&store, names, &config.state_title)
            .find_state()
            .unwrap()
            .unwrap();
        assert_eq!(state.last_calculated_at, Some(at(2024, 2, 1, 0)));
    }

    #[test]
    fn second_run_over_unchanged_data_writes_nothing() {
        let config = EngineConfig::default();
        let store = MemoryStore::new();
        store.person(EventKind::Start, day(2024, 1, 1));
        store.person(EventKind::End, day(2024, 1, 5));
        store.person(EventKind::Start, day(2024, 1, 29));
        store.person(EventKind::End, day(2024, 2, 2));
        store.person(EventKind::DailyNote, day(2024, 2, 3));
        // Writes land after the run's own `now`, as with a real store.
        store.set_clock(at(2024, 3, 1, 1));

        let first = run(&store, &config, None, at(2024, 3, 1, 0), RunOptions::default());
        assert!(first.writes > 0);

        // The first run's writes reopen the window, but nothing differs.
        let second = run(&store, &config, None, at(2024, 3, 2, 0), RunOptions::default());
        assert_eq!(
            second.window,
            Some(Window::Suffix {
                first_start: 0,
                boundary: day(2024, 1, 1)
            })
        );
        assert_eq!(second.writes, 0);

        let forced = RunOptions {
            force_full: true,
            ..RunOptions::default()
        };
        let third = run(&store, &config, None, at(2024, 3, 3, 0), forced);
        assert_eq!(third.window, Some(Window::Full));
        assert_eq!(third.writes, 0);
    }

    fn seed_cycles(store: &MemoryStore, cycles: usize) -> Vec<RecordId> {
        [
            (EventKind::Start, day(2024, 1, 1)),
            (EventKind::End, day(2024, 1, 5)),
            (EventKind::Start, day(2024, 1, 29)),
            (EventKind::End, day(2024, 2, 2)),
            (EventKind::Start, day(2024, 2, 26)),
            (EventKind::End, day(2024, 3, 1)),
            (EventKind::Start, day(2024, 3, 25)),
            (EventKind::End, day(2024, 3, 29)),
        ]
        .into_iter()
        .take(cycles * 2)
        .map(|(kind, date)| store.person(kind, date))
        .collect()
    }

    /// Seeds two stores, runs both, applies `edit` to both, then reruns one
    /// incrementally and the other in full.
    fn rerun_after_edit(
        config: &EngineConfig,
        cycles: usize,
        edit: impl Fn(&MemoryStore, &[RecordId]),
    ) -> (MemoryStore, MemoryStore, Vec<RecordId>, RunReport) {
        let incremental = MemoryStore::new();
        let full = MemoryStore::new();
        let ids = seed_cycles(&incremental, cycles);
        seed_cycles(&full, cycles);

        for store in [&incremental, &full] {
            store.set_clock(at(2024, 6, 1, 0));
            run(store, config, None, at(2024, 6, 1, 1), RunOptions::default());
            store.set_clock(at(2024, 6, 2, 0));
            edit(store, &ids);
        }

        let report = run(&incremental, config, None, at(2024, 6, 2, 1), RunOptions::default());
        let forced = RunOptions {
            force_full: true,
            ..RunOptions::default()
        };
        run(&full, config, None, at(2024, 6, 2, 1), forced);
        (incremental, full, ids, report)
    }

    fn assert_same(incremental: &MemoryStore, full: &MemoryStore, ids: &[RecordId]) {
        for id in ids {
            assert_eq!(
                incremental.get(id).properties,
                full.get(id).properties,
                "record {id} differs"
            );
        }
    }

    #[test]
    fn incremental_window_matches_full_recomputation() {
        let config = EngineConfig::default();
        let names = &config.properties;
        // Move the second End two days later.
        let (incremental, full, ids, report) = rerun_after_edit(&config, 4, |store, ids| {
            store
                .update_record(&ids[3], &Fields::new().day(&names.date, Some(day(2024, 2, 4))))
                .unwrap();
        });

        assert_eq!(
            report.window,
            Some(Window::Suffix {
                first_start: 1,
                boundary: day(2024, 1, 29)
            })
        );
        assert_same(&incremental, &full, &ids[2..]);
        assert_eq!(number(&incremental.get(&ids[2]), &names.cycle_days), Some(24.0));
        assert_eq!(number(&incremental.get(&ids[3]), &names.bleed_days), Some(7.0));
        assert_eq!(number(&incremental.get(&ids[4]), &names.cycle_days), Some(22.0));
    }

    #[test]
    fn end_moved_past_last_start_recomputes_everything() {
        let config = EngineConfig::default();
        let names = &config.properties;
        let (incremental, full, ids, report) = rerun_after_edit(&config, 3, |store, ids| {
            store
                .update_record(&ids[1], &Fields::new().day(&names.date, Some(day(2024, 3, 2))))
                .unwrap();
        });

        assert_eq!(report.window, Some(Window::Full));
        assert_same(&incremental, &full, &ids);
        // The second Start lost the End it counted from.
        assert_eq!(number(&incremental.get(&ids[2]), &names.cycle_days), Some(0.0));
    }

    #[test]
    fn end_edited_into_noise_still_opens_the_window() {
        let config = EngineConfig::default();
        let names = &config.properties;
        let (incremental, full, ids, report) = rerun_after_edit(&config, 3, |store, ids| {
            store
                .update_record(&ids[1], &Fields::new().select(&names.kind, None))
                .unwrap();
        });

        assert_eq!(
            report.window,
            Some(Window::Suffix {
                first_start: 0,
                boundary: day(2024, 1, 1)
            })
        );
        assert_eq!(report.ends, 2);
        assert_same(&incremental, &full, &ids);
        assert_eq!(number(&incremental.get(&ids[2]), &names.cycle_days), Some(0.0));
    }

    #[test]
    fn strict_mode_excludes_automated_start() {
        let config = EngineConfig {
            strict_templates: true,
            ..EngineConfig::default()
        };
        let names = &config.properties;
        let store = MemoryStore::new();
        let s1 = store.person(EventKind::Start, day(2024, 1, 1));
        store.person(EventKind::End, day(2024, 1, 5));
        let bot = store.event(EventKind::Start, day(2024, 1, 15), Author::Automation);
        let s2 = store.person(EventKind::Start, day(2024, 1, 29));

        let report = run(&store, &config, None, at(2024, 2, 1, 0), RunOptions::default());
        assert_eq!(report.excluded, 1);
        assert_eq!(report.violations, 1);
        assert_eq!(report.starts, 2);

        let bot = store.get(&bot);
        assert!(flag(&bot, &names.template_error));
        assert_eq!(number(&bot, &names.cycle_days), None);
        assert!(!flag(&store.get(&s1), &names.template_error));

        let s2 = store.get(&s2);
        assert_eq!(number(&s2, &names.cycle_days), Some(24.0));
        assert_eq!(next_period(&s2, names), Some(day(2024, 2, 22)));
    }

    #[test]
    fn strict_mode_automated_end_still_anchors_next_cycle() {
        let config = EngineConfig {
            strict_templates: true,
            ..EngineConfig::default()
        };
        let names = &config.properties;
        let store = MemoryStore::new();
        let s1 = store.person(EventKind::Start, day(2024, 1, 1));
        let bot = store.event(EventKind::End, day(2024, 1, 5), Author::Automation);
        let s2 = store.person(EventKind::Start, day(2024, 1, 29));

        let report = run(&store, &config, None, at(2024, 2, 1, 0), RunOptions::default());
        assert_eq!(report.excluded, 1);
        assert_eq!((report.starts, report.ends), (2, 0));

        let bot = store.get(&bot);
        assert!(flag(&bot, &names.template_error));
        assert_eq!(number(&bot, &names.bleed_days), None);
        assert_eq!(number(&bot, &names.avg_bleed), None);

        assert_eq!(number(&store.get(&s1), &names.cycle_days), Some(0.0));
        assert_eq!(number(&store.get(&s2), &names.cycle_days), Some(24.0));
    }

    #[test]
    fn lenient_mode_flags_but_keeps_automated_start() {
        let config = EngineConfig::default();
        let names = &config.properties;
        let store = MemoryStore::new();
        store.person(EventKind::Start, day(2024, 1, 1));
        let bot = store.event(EventKind::Start, day(2024, 1, 15), Author::Automation);

        let report = run(&store, &config, None, at(2024, 2, 1, 0), RunOptions::default());
        assert_eq!(report.excluded, 0);
        assert_eq!(report.starts, 2);

        let bot = store.get(&bot);
        assert!(flag(&bot, &names.template_error));
        assert!(flag(&bot, &names.latest_start));
    }

    #[test]
    fn same_day_starts_are_both_flagged() {
        let config = EngineConfig::default();
        let names = &config.properties;
        let store = MemoryStore::new();
        let a = store.person(EventKind::Start, day(2024, 2, 10));
        let b = store.person(EventKind::Start, day(2024, 2, 10));
        let other = store.person(EventKind::End, day(2024, 2, 14));

        let report = run(&store, &config, None, at(2024, 3, 1, 0), RunOptions::default());
        assert_eq!(report.duplicates, 2);
        assert!(flag(&store.get(&a), &names.input_error));
        assert!(flag(&store.get(&b), &names.input_error));
        assert!(!flag(&store.get(&other), &names.input_error));
    }

    #[test]
    fn trigger_ten_seconds_later_is_debounced() {
        let config = EngineConfig::default();
        let names = &config.properties;
        let store = MemoryStore::new();
        store.person(EventKind::Start, day(2024, 1, 1));
        let first_at = at(2024, 2, 1, 0);
        let second_at = first_at + TimeDelta::seconds(10);

        let first = run(&store, &config, Some("edited"), first_at, RunOptions::default());
        assert!(!first.debounced);
        store.reset_updates();

        let second = run(&store, &config, Some("edited"), second_at, RunOptions::default());
        assert!(second.debounced);
        assert_eq!(second.writes, 0);
        // Only the trigger timestamp was written.
        assert_eq!(store.updates(), 1);

        let state = RecordStateRepository::new(&store, names, &config.state_title)
            .find_state()
            .unwrap()
            .unwrap();
        assert_eq!(state.last_triggered_at, Some(second_at));
        assert_eq!(state.last_calculated_at, Some(first_at));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let config = EngineConfig {
            create_plan_records: true,
            ..EngineConfig::default()
        };
        let store = MemoryStore::new();
        store.person(EventKind::Start, day(2024, 1, 1));
        store.person(EventKind::End, day(2024, 1, 5));

        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };
        let report = run(&store, &config, None, at(2024, 2, 1, 0), options);
        assert!(report.writes > 0);
        assert_eq!(report.created, 2);
        assert_eq!(store.updates(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn plan_records_are_created_once() {
        let config = EngineConfig {
            create_plan_records: true,
            ..EngineConfig::default()
        };
        let names = &config.properties;
        let store = MemoryStore::new();
        store.person(EventKind::Start, day(2024, 1, 1));

        let first = run(&store, &config, None, at(2024, 1, 2, 0), RunOptions::default());
        assert_eq!(first.created, 2);
        let second = run(&store, &config, None, at(2024, 1, 3, 0), RunOptions::default());
        assert_eq!(second.created, 0);

        let plans = store
            .query_filtered(&Filter::SelectEquals {
                property: names.kind.clone(),
                value: config.kinds.label(EventKind::PlannedPeriod).to_string(),
            })
            .unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].created_by, Author::Automation);
        assert_eq!(
            plans[0].title(&names.title).unwrap(),
            Some("Planned Period / 01/29")
        );
    }

    #[test]
    fn invalid_config_aborts_before_any_access() {
        let config = EngineConfig {
            default_cycle_days: 0,
            ..EngineConfig::default()
        };
        let store = MemoryStore::new();
        let repo = RecordStateRepository::new(&store, &config.properties, &config.state_title);
        let err = run_pipeline(&store, &repo, &config, None, at(2024, 1, 1, 0), RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert_eq!(store.len(), 0);
    }
}
