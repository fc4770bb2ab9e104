//! Seams to the external record store and the persisted calculation state.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::PropertyNames;
use crate::record::{Fields, Filter, PropertyError, Record};
use crate::types::RecordId;

/// Errors surfaced by a record store. All of them abort the current run.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the request.
    #[error("record store request failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// No record with this ID exists.
    #[error("record {id} not found")]
    NotFound { id: String },
    /// The backend returned a record the engine cannot interpret.
    #[error("malformed record {id}: {message}")]
    Malformed { id: String, message: String },
    /// A property had an unexpected type.
    #[error(transparent)]
    Property(#[from] PropertyError),
}

impl StoreError {
    /// Wraps any backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// A structured record store.
///
/// Every call is independent; the engine assumes no transactions across calls.
pub trait RecordStore {
    /// Returns every record, ascending by the named date property.
    /// Implementations page through results internally.
    fn query_all(&self, sort_by: &str) -> Result<Vec<Record>, StoreError>;

    /// Returns every record matching the filter.
    fn query_filtered(&self, filter: &Filter) -> Result<Vec<Record>, StoreError>;

    /// Creates a record authored by the engine and returns it.
    fn create_record(&self, fields: &Fields) -> Result<Record, StoreError>;

    /// Updates the listed properties of a record, leaving the rest unchanged.
    fn update_record(&self, id: &RecordId, fields: &Fields) -> Result<(), StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn query_all(&self, sort_by: &str) -> Result<Vec<Record>, StoreError> {
        (**self).query_all(sort_by)
    }

    fn query_filtered(&self, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        (**self).query_filtered(filter)
    }

    fn create_record(&self, fields: &Fields) -> Result<Record, StoreError> {
        (**self).create_record(fields)
    }

    fn update_record(&self, id: &RecordId, fields: &Fields) -> Result<(), StoreError> {
        (**self).update_record(id, fields)
    }
}

/// Checkpoint timestamps persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationState {
    /// The backing record.
    pub id: RecordId,
    /// Invocation time of the last run that completed.
    pub last_calculated_at: Option<DateTime<Utc>>,
    /// Time of the last invocation, debounced or not.
    pub last_triggered_at: Option<DateTime<Utc>>,
}

/// Loads and saves the calculation state.
///
/// State is reloaded on every invocation; nothing is cached in memory.
pub trait StateRepository {
    /// Reads the state without creating it.
    fn find_state(&self) -> Result<Option<CalculationState>, StoreError>;
    fn load_or_create_state(&self, now: DateTime<Utc>) -> Result<CalculationState, StoreError>;
    fn save_last_triggered(&self, state: &CalculationState) -> Result<(), StoreError>;
    fn save_last_calculated(&self, state: &CalculationState) -> Result<(), StoreError>;
}

/// State kept in a singleton record of the same store, found by a reserved title.
#[derive(Debug)]
pub struct RecordStateRepository<'a, S> {
    store: &'a S,
    properties: &'a PropertyNames,
    title: &'a str,
}

impl<'a, S: RecordStore> RecordStateRepository<'a, S> {
    pub const fn new(store: &'a S, properties: &'a PropertyNames, title: &'a str) -> Self {
        Self {
            store,
            properties,
            title,
        }
    }

    fn timestamp(record: &Record, name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        match record.date(name) {
            Ok(value) => Ok(value.map(|d| d.instant())),
            // A fresh state record has not been given the checkpoint columns yet.
            Err(PropertyError::Missing { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn state_of(&self, record: Record) -> Result<CalculationState, StoreError> {
        Ok(CalculationState {
            last_calculated_at: Self::timestamp(&record, &self.properties.last_calculated_at)?,
            last_triggered_at: Self::timestamp(&record, &self.properties.last_triggered_at)?,
            id: record.id,
        })
    }

    fn save(&self, id: &RecordId, name: &str, at: Option<DateTime<Utc>>) -> Result<(), StoreError> {
        let Some(at) = at else {
            return Ok(());
        };
        self.store
            .update_record(id, &Fields::new().instant(name, at))
    }
}

impl<S: RecordStore> StateRepository for RecordStateRepository<'_, S> {
    fn find_state(&self) -> Result<Option<CalculationState>, StoreError> {
        let filter = Filter::TitleEquals {
            property: self.properties.title.clone(),
            value: self.title.to_string(),
        };
        self.store
            .query_filtered(&filter)?
            .into_iter()
            .next()
            .map(|record| self.state_of(record))
            .transpose()
    }

    fn load_or_create_state(&self, now: DateTime<Utc>) -> Result<CalculationState, StoreError> {
        if let Some(state) = self.find_state()? {
            return Ok(state);
        }
        tracing::info!(title = self.title, "creating state record");
        let fields = Fields::new()
            .title(&self.properties.title, self.title)
            .day(&self.properties.date, Some(now.date_naive()));
        let record = self.store.create_record(&fields)?;
        self.state_of(record)
    }

    fn save_last_triggered(&self, state: &CalculationState) -> Result<(), StoreError> {
        self.save(
            &state.id,
            &self.properties.last_triggered_at,
            state.last_triggered_at,
        )
    }

    fn save_last_calculated(&self, state: &CalculationState) -> Result<(), StoreError> {
        self.save(
            &state.id,
            &self.properties.last_calculated_at,
            state.last_calculated_at,
        )
    }
}
