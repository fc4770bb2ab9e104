//! Typed view of records held by the external store.
//!
//! Stores hand the engine [`Record`]s whose properties are already decoded
//! into [`PropertyValue`]s. Accessors distinguish a property that does not
//! exist on the record (an error) from one that exists but is unset (`None`).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Author, RecordId};

/// Errors raised by typed property access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// The record has no property with this name.
    #[error("record {record} has no property {property:?}")]
    Missing { record: String, property: String },
    /// The property exists but holds a different type.
    #[error("property {property:?} on record {record} is {found}, expected {expected}")]
    TypeMismatch {
        record: String,
        property: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// A date property value: either a calendar day or a precise instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DateValue {
    Day(NaiveDate),
    Instant(DateTime<Utc>),
}

impl DateValue {
    /// Parses `YYYY-MM-DD` or an RFC 3339 timestamp.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Some(Self::Day(day));
        }
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| Self::Instant(t.with_timezone(&Utc)))
    }

    /// The calendar day this value falls on in the given timezone.
    ///
    /// Day values carry no time of day and are returned unchanged.
    pub fn day_in(&self, offset: FixedOffset) -> NaiveDate {
        match self {
            Self::Day(day) => *day,
            Self::Instant(t) => t.with_timezone(&offset).date_naive(),
        }
    }

    /// The instant this value denotes, taking day values as UTC midnight.
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            Self::Day(day) => day.and_time(chrono::NaiveTime::MIN).and_utc(),
            Self::Instant(t) => *t,
        }
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(day) => write!(f, "{}", day.format("%Y-%m-%d")),
            Self::Instant(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

impl TryFrom<String> for DateValue {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid date value: {value}"))
    }
}

impl From<DateValue> for String {
    fn from(value: DateValue) -> Self {
        value.to_string()
    }
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Title(String),
    Text(String),
    Date(Option<DateValue>),
    Select(Option<String>),
    Number(Option<f64>),
    Checkbox(bool),
}

impl PropertyValue {
    /// Name of the value's type, for diagnostics.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Title(_) => "title",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::Select(_) => "select",
            Self::Number(_) => "number",
            Self::Checkbox(_) => "checkbox",
        }
    }
}

/// A record as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub properties: BTreeMap<String, PropertyValue>,
    pub created_by: Author,
    pub created_at: DateTime<Utc>,
    pub last_edited_at: DateTime<Utc>,
}

impl Record {
    fn property(&self, name: &str) -> Result<&PropertyValue, PropertyError> {
        self.properties
            .get(name)
            .ok_or_else(|| PropertyError::Missing {
                record: self.id.to_string(),
                property: name.to_string(),
            })
    }

    fn mismatch(&self, name: &str, expected: &'static str, found: &PropertyValue) -> PropertyError {
        PropertyError::TypeMismatch {
            record: self.id.to_string(),
            property: name.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    /// Reads a title or text property. Empty text reads as unset.
    pub fn title(&self, name: &str) -> Result<Option<&str>, PropertyError> {
        match self.property(name)? {
            PropertyValue::Title(s) | PropertyValue::Text(s) => {
                Ok(Some(s.as_str()).filter(|s| !s.is_empty()))
            }
            other => Err(self.mismatch(name, "title", other)),
        }
    }

    pub fn date(&self, name: &str) -> Result<Option<DateValue>, PropertyError> {
        match self.property(name)? {
            PropertyValue::Date(value) => Ok(*value),
            other => Err(self.mismatch(name, "date", other)),
        }
    }

    pub fn select(&self, name: &str) -> Result<Option<&str>, PropertyError> {
        match self.property(name)? {
            PropertyValue::Select(value) => Ok(value.as_deref()),
            other => Err(self.mismatch(name, "select", other)),
        }
    }

    pub fn number(&self, name: &str) -> Result<Option<f64>, PropertyError> {
        match self.property(name)? {
            PropertyValue::Number(value) => Ok(*value),
            other => Err(self.mismatch(name, "number", other)),
        }
    }

    pub fn checkbox(&self, name: &str) -> Result<bool, PropertyError> {
        match self.property(name)? {
            PropertyValue::Checkbox(value) => Ok(*value),
            other => Err(self.mismatch(name, "checkbox", other)),
        }
    }
}

/// A set of property values to write. Unlisted properties are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, PropertyValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn title(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, PropertyValue::Title(value.into()));
        self
    }

    #[must_use]
    pub fn day(mut self, name: &str, day: Option<NaiveDate>) -> Self {
        self.set(name, PropertyValue::Date(day.map(DateValue::Day)));
        self
    }

    #[must_use]
    pub fn instant(mut self, name: &str, at: DateTime<Utc>) -> Self {
        self.set(name, PropertyValue::Date(Some(DateValue::Instant(at))));
        self
    }

    #[must_use]
    pub fn select(mut self, name: &str, value: Option<&str>) -> Self {
        self.set(name, PropertyValue::Select(value.map(str::to_string)));
        self
    }

    /// Writes an integer day count as a number.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "day counts are far below f64's exact integer range"
    )]
    pub fn count(mut self, name: &str, value: i64) -> Self {
        self.set(name, PropertyValue::Number(Some(value as f64)));
        self
    }

    #[must_use]
    pub fn checkbox(mut self, name: &str, value: bool) -> Self {
        self.set(name, PropertyValue::Checkbox(value));
        self
    }

    /// Inserts or replaces one property value.
    pub fn set(&mut self, name: &str, value: PropertyValue) {
        self.0.insert(name.to_string(), value);
    }

    /// Overlays `other` on top of these fields.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops every field whose value already matches the record.
    #[must_use]
    pub fn changed_from(mut self, record: &Record) -> Self {
        self.0
            .retain(|name, value| record.properties.get(name) != Some(value));
        self
    }
}

impl IntoIterator for Fields {
    type Item = (String, PropertyValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Predicate language for `RecordStore::query_filtered`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    TitleEquals { property: String, value: String },
    SelectEquals { property: String, value: String },
    DateEquals { property: String, date: NaiveDate },
    And(Vec<Filter>),
}

impl Filter {
    /// Evaluates the predicate in process, for stores that cannot push it down.
    ///
    /// Date comparison uses the UTC day of instant values.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::TitleEquals { property, value } => {
                record.title(property).ok().flatten() == Some(value.as_str())
            }
            Self::SelectEquals { property, value } => {
                record.select(property).ok().flatten() == Some(value.as_str())
            }
            Self::DateEquals { property, date } => record
                .date(property)
                .ok()
                .flatten()
                .is_some_and(|d| d.instant().date_naive() == *date),
            Self::And(filters) => filters.iter().all(|f| f.matches(record)),
        }
    }
}
