//! Display titles derived from an event's kind and date.

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};

use crate::config::EngineConfig;
use crate::event::Event;
use crate::event_kind::EventKind;

/// Part of the day a daily note was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBand {
    Morning,
    Afternoon,
    Night,
}

impl TimeBand {
    /// Band for an hour of day; both bounds are inclusive.
    pub const fn for_hour(hour: u32, morning_end: u32, afternoon_end: u32) -> Self {
        if hour <= morning_end {
            Self::Morning
        } else if hour <= afternoon_end {
            Self::Afternoon
        } else {
            Self::Night
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "Morning",
            Self::Afternoon => "Afternoon",
            Self::Night => "Night",
        }
    }
}

/// `"<label> / MM/DD"`, with the creation time band appended for daily notes.
pub fn compose(
    kind: EventKind,
    date: NaiveDate,
    created_at: DateTime<Utc>,
    config: &EngineConfig,
    offset: FixedOffset,
) -> String {
    let label = config.kinds.label(kind);
    let base = format!("{label} / {}", date.format("%m/%d"));
    if kind != EventKind::DailyNote {
        return base;
    }
    let hour = created_at.with_timezone(&offset).hour();
    let band = TimeBand::for_hour(hour, config.morning_end_hour, config.afternoon_end_hour);
    format!("{base} ({})", band.as_str())
}

pub fn title_for(event: &Event, config: &EngineConfig, offset: FixedOffset) -> String {
    compose(event.kind, event.date, event.created_at, config, offset)
}
