//! Engine configuration.
//!
//! Built once at process entry (the CLI extracts it with `figment`), validated,
//! and passed by reference into every stage. Nothing in this crate reads
//! environment variables.

use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event_kind::KindLabels;

/// Invalid configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: i64 },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: i64 },
    #[error("trailing average bounds are inverted: min {min} > max {max}")]
    InvertedBounds { min: i64, max: i64 },
    #[error("UTC offset of {hours} hours is out of range")]
    InvalidOffset { hours: i32 },
    #[error("morning band ends at {morning}h, after the afternoon band ({afternoon}h)")]
    InvertedBands { morning: u32, afternoon: u32 },
    #[error("{field} cannot be empty")]
    EmptyName { field: &'static str },
}

/// How the rolling cycle average is computed.
///
/// The two disciplines give different predictions for the same data and do
/// not compose; a deployment picks one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AveragingStrategy {
    /// Mean of every non-zero cycle length on record.
    #[default]
    FullHistory,
    /// Mean of the most recent `window` cycle lengths inside
    /// `[min_days, max_days]`. Values outside the bounds are ignored entirely.
    Trailing {
        min_days: i64,
        max_days: i64,
        window: usize,
    },
}

impl AveragingStrategy {
    /// Trailing average with the stock bounds (17-60 days, last 6 cycles).
    pub const fn trailing() -> Self {
        Self::Trailing {
            min_days: 17,
            max_days: 60,
            window: 6,
        }
    }
}

/// Property (column) names for every field the engine reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyNames {
    pub title: String,
    pub kind: String,
    pub date: String,
    pub cycle_days: String,
    pub avg_cycle: String,
    pub bleed_days: String,
    pub avg_bleed: String,
    pub next_period: String,
    pub ovulation: String,
    pub input_error: String,
    pub template_error: String,
    pub latest_avg_cycle: String,
    pub latest_avg_bleed: String,
    pub latest_cycle: String,
    pub latest_bleed: String,
    pub latest_start: String,
    pub latest_end: String,
    pub last_calculated_at: String,
    pub last_triggered_at: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            title: "Title".to_string(),
            kind: "Kind".to_string(),
            date: "Date".to_string(),
            cycle_days: "Cycle Days".to_string(),
            avg_cycle: "Average Cycle".to_string(),
            bleed_days: "Period Days".to_string(),
            avg_bleed: "Average Period Days".to_string(),
            next_period: "Next Period".to_string(),
            ovulation: "Ovulation".to_string(),
            input_error: "Input Error".to_string(),
            template_error: "Template Mismatch".to_string(),
            latest_avg_cycle: "Latest Average Cycle".to_string(),
            latest_avg_bleed: "Latest Average Period".to_string(),
            latest_cycle: "Latest Cycle Days".to_string(),
            latest_bleed: "Latest Period Days".to_string(),
            latest_start: "Latest Start".to_string(),
            latest_end: "Latest End".to_string(),
            last_calculated_at: "Last Calculated At".to_string(),
            last_triggered_at: "Last Triggered At".to_string(),
        }
    }
}

impl PropertyNames {
    fn all(&self) -> [(&'static str, &str); 19] {
        [
            ("properties.title", &self.title),
            ("properties.kind", &self.kind),
            ("properties.date", &self.date),
            ("properties.cycle_days", &self.cycle_days),
            ("properties.avg_cycle", &self.avg_cycle),
            ("properties.bleed_days", &self.bleed_days),
            ("properties.avg_bleed", &self.avg_bleed),
            ("properties.next_period", &self.next_period),
            ("properties.ovulation", &self.ovulation),
            ("properties.input_error", &self.input_error),
            ("properties.template_error", &self.template_error),
            ("properties.latest_avg_cycle", &self.latest_avg_cycle),
            ("properties.latest_avg_bleed", &self.latest_avg_bleed),
            ("properties.latest_cycle", &self.latest_cycle),
            ("properties.latest_bleed", &self.latest_bleed),
            ("properties.latest_start", &self.latest_start),
            ("properties.latest_end", &self.latest_end),
            ("properties.last_calculated_at", &self.last_calculated_at),
            ("properties.last_triggered_at", &self.last_triggered_at),
        ]
    }
}

/// Configuration consumed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Days from ovulation to the next period.
    pub luteal_days: i64,
    /// Fallback cycle length when no average is available.
    pub default_cycle_days: i64,
    /// Minimum spacing between triggered runs.
    pub min_trigger_interval_secs: u64,
    /// Exclude provenance violators from every computation.
    pub strict_templates: bool,
    /// Upsert planned-period and planned-ovulation records at predicted dates.
    pub create_plan_records: bool,
    /// Reference timezone for dates and titles, as whole hours east of UTC.
    pub utc_offset_hours: i32,
    /// Last hour (inclusive) titled as morning for daily notes.
    pub morning_end_hour: u32,
    /// Last hour (inclusive) titled as afternoon for daily notes.
    pub afternoon_end_hour: u32,
    pub averaging: AveragingStrategy,
    /// Reserved title of the singleton state record.
    pub state_title: String,
    pub properties: PropertyNames,
    pub kinds: KindLabels,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            luteal_days: 14,
            default_cycle_days: 28,
            min_trigger_interval_secs: 45,
            strict_templates: false,
            create_plan_records: false,
            utc_offset_hours: 9,
            morning_end_hour: 10,
            afternoon_end_hour: 16,
            averaging: AveragingStrategy::FullHistory,
            state_title: "Internal: State".to_string(),
            properties: PropertyNames::default(),
            kinds: KindLabels::default(),
        }
    }
}

impl EngineConfig {
    /// Checks value ranges. Call once after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_cycle_days <= 0 {
            return Err(ConfigError::NotPositive {
                field: "default_cycle_days",
                value: self.default_cycle_days,
            });
        }
        if self.luteal_days < 0 {
            return Err(ConfigError::Negative {
                field: "luteal_days",
                value: self.luteal_days,
            });
        }
        if let AveragingStrategy::Trailing {
            min_days,
            max_days,
            window,
        } = self.averaging
        {
            if window == 0 {
                return Err(ConfigError::NotPositive {
                    field: "averaging.window",
                    value: 0,
                });
            }
            if min_days > max_days {
                return Err(ConfigError::InvertedBounds {
                    min: min_days,
                    max: max_days,
                });
            }
        }
        self.reference_offset()?;
        if self.morning_end_hour > self.afternoon_end_hour {
            return Err(ConfigError::InvertedBands {
                morning: self.morning_end_hour,
                afternoon: self.afternoon_end_hour,
            });
        }
        if self.state_title.trim().is_empty() {
            return Err(ConfigError::EmptyName {
                field: "state_title",
            });
        }
        for (field, name) in self.properties.all() {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyName { field });
            }
        }
        Ok(())
    }

    /// The reference timezone as a fixed offset.
    pub fn reference_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidOffset {
                hours: self.utc_offset_hours,
            })
    }

    pub const fn min_trigger_interval(&self) -> Duration {
        Duration::from_secs(self.min_trigger_interval_secs)
    }
}
