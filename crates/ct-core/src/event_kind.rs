//! Event kind enum and the select labels that name each kind in the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of records in the cycle log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// First day of an episode, logged by a person.
    Start,
    /// Last day of an episode, logged by a person.
    End,
    /// Predicted next period, written by automation.
    PlannedPeriod,
    /// Predicted ovulation day, written by automation.
    PlannedOvulation,
    /// Free-form daily entry. Exempt from provenance checks.
    DailyNote,
}

impl EventKind {
    pub const ALL: [Self; 5] = [
        Self::Start,
        Self::End,
        Self::PlannedPeriod,
        Self::PlannedOvulation,
        Self::DailyNote,
    ];

    /// Canonical snake-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::PlannedPeriod => "planned_period",
            Self::PlannedOvulation => "planned_ovulation",
            Self::DailyNote => "daily_note",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            "planned_period" | "plan" => Ok(Self::PlannedPeriod),
            "planned_ovulation" | "ovulation" => Ok(Self::PlannedOvulation),
            "daily_note" | "daily" => Ok(Self::DailyNote),
            _ => Err(UnknownEventKind(s.to_string())),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown event kind strings.
#[derive(Debug, Clone)]
pub struct UnknownEventKind(String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

/// Select-option labels used by the record store for each kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindLabels {
    pub start: String,
    pub end: String,
    pub planned_period: String,
    pub planned_ovulation: String,
    pub daily_note: String,
}

impl Default for KindLabels {
    fn default() -> Self {
        Self {
            start: "Start".to_string(),
            end: "End".to_string(),
            planned_period: "Planned Period".to_string(),
            planned_ovulation: "Planned Ovulation".to_string(),
            daily_note: "Daily Note".to_string(),
        }
    }
}

impl KindLabels {
    /// Returns the store label for a kind.
    pub fn label(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Start => &self.start,
            EventKind::End => &self.end,
            EventKind::PlannedPeriod => &self.planned_period,
            EventKind::PlannedOvulation => &self.planned_ovulation,
            EventKind::DailyNote => &self.daily_note,
        }
    }

    /// Maps a store label back to its kind. Unrecognized labels yield `None`.
    pub fn kind_of(&self, label: &str) -> Option<EventKind> {
        EventKind::ALL
            .into_iter()
            .find(|kind| self.label(*kind) == label)
    }
}
