//! In-memory record store and fixtures for unit tests.

use std::cell::{Cell, RefCell};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::config::EngineConfig;
use crate::event_kind::EventKind;
use crate::record::{Fields, Filter, Record};
use crate::store::{RecordStore, StoreError};
use crate::types::{Author, RecordId};

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
        .single()
        .expect("valid test timestamp")
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}

/// A record store backed by a vector. Edits are stamped with a settable clock.
pub struct MemoryStore {
    records: RefCell<Vec<Record>>,
    clock: Cell<DateTime<Utc>>,
    next_id: Cell<u32>,
    updates: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RefCell::new(Vec::new()),
            clock: Cell::new(at(2024, 1, 1, 0)),
            next_id: Cell::new(1),
            updates: Cell::new(0),
        }
    }

    pub fn set_clock(&self, now: DateTime<Utc>) {
        self.clock.set(now);
    }

    fn next_id(&self) -> RecordId {
        let n = self.next_id.get();
        self.next_id.set(n + 1);
        RecordId::new(format!("rec-{n}")).expect("non-empty id")
    }

    /// Inserts a record as if a user of the store had created it.
    pub fn insert(&self, fields: Fields, author: Author) -> RecordId {
        let id = self.next_id();
        let now = self.clock.get();
        self.records.borrow_mut().push(Record {
            id: id.clone(),
            properties: fields.into_iter().collect(),
            created_by: author,
            created_at: now,
            last_edited_at: now,
        });
        id
    }

    /// Inserts an event record with the default property names and labels.
    pub fn event(&self, kind: EventKind, date: NaiveDate, author: Author) -> RecordId {
        let config = EngineConfig::default();
        let names = &config.properties;
        let fields = Fields::new()
            .title(&names.title, "")
            .select(&names.kind, Some(config.kinds.label(kind)))
            .day(&names.date, Some(date));
        self.insert(fields, author)
    }

    pub fn person(&self, kind: EventKind, date: NaiveDate) -> RecordId {
        self.event(kind, date, Author::Person)
    }

    pub fn get(&self, id: &RecordId) -> Record {
        self.records
            .borrow()
            .iter()
            .find(|r| &r.id == id)
            .cloned()
            .expect("record exists")
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Number of `update_record` calls since the last reset.
    pub fn updates(&self) -> usize {
        self.updates.get()
    }

    pub fn reset_updates(&self) {
        self.updates.set(0);
    }
}

impl RecordStore for MemoryStore {
    fn query_all(&self, sort_by: &str) -> Result<Vec<Record>, StoreError> {
        let mut records = self.records.borrow().clone();
        records.sort_by_key(|r| {
            r.date(sort_by)
                .ok()
                .flatten()
                .map_or(DateTime::<Utc>::MAX_UTC, |d| d.instant())
        });
        Ok(records)
    }

    fn query_filtered(&self, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .records
            .borrow()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    fn create_record(&self, fields: &Fields) -> Result<Record, StoreError> {
        let id = self.insert(fields.clone(), Author::Automation);
        Ok(self.get(&id))
    }

    fn update_record(&self, id: &RecordId, fields: &Fields) -> Result<(), StoreError> {
        self.updates.set(self.updates.get() + 1);
        let mut records = self.records.borrow_mut();
        let record = records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        for (name, value) in fields.iter() {
            record.properties.insert(name.clone(), value.clone());
        }
        record.last_edited_at = self.clock.get();
        Ok(())
    }
}
