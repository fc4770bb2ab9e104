//! Minimum-interval gate for externally triggered runs.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::store::CalculationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceDecision {
    Proceed,
    /// Another trigger arrived `elapsed` ago, inside the minimum interval.
    Suppressed { elapsed: Duration },
}

impl DebounceDecision {
    pub const fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed { .. })
    }
}

/// Decides whether an invocation runs the pipeline.
///
/// Only triggered invocations (those with a reason) are debounced. A clock
/// that moved backwards counts as zero elapsed time.
pub fn evaluate(
    state: &CalculationState,
    reason: Option<&str>,
    now: DateTime<Utc>,
    min_interval: Duration,
) -> DebounceDecision {
    let (Some(reason), Some(last)) = (reason, state.last_triggered_at) else {
        return DebounceDecision::Proceed;
    };
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    if elapsed < min_interval {
        tracing::info!(
            reason,
            elapsed_secs = elapsed.as_secs(),
            min_interval_secs = min_interval.as_secs(),
            "trigger debounced"
        );
        DebounceDecision::Suppressed { elapsed }
    } else {
        DebounceDecision::Proceed
    }
}
