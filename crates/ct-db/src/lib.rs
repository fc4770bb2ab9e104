//! SQLite record store for the cycle tracker.
//!
//! Provides a local [`RecordStore`] using `rusqlite`, for use without a remote
//! store and in tests.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved between threads but not shared without external
//! synchronization.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`), so lexicographic and chronological order agree.
//!
//! ## Property Storage
//!
//! The `properties` column stores the record's typed property map as JSON, in
//! the serde form of [`PropertyValue`] (`{"type": "date", "value": "2024-01-05"}`).
//! Records have no fixed columns beyond identity and provenance, so any
//! configured property names work without a migration.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use ct_core::{Author, Fields, Filter, PropertyValue, Record, RecordId, RecordStore, StoreError};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use uuid::Uuid;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for record {record_id}: {timestamp}")]
    TimestampParse {
        record_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// Stored or supplied properties could not be (de)serialized.
    #[error("invalid properties for record {record_id}")]
    Properties {
        record_id: String,
        #[source]
        source: serde_json::Error,
    },
    /// A row that does not describe a valid record.
    #[error("invalid record {record_id}: {message}")]
    InvalidRecord { record_id: String, message: String },
    #[error("record {0} not found")]
    NotFound(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(id) => Self::NotFound { id },
            DbError::InvalidRecord { record_id, message } => Self::Malformed {
                id: record_id,
                message,
            },
            other => Self::backend(other),
        }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- seq: insertion order, the tie-breaker for records on the same date
            -- created_by: 'person' or 'automation'
            -- properties: JSON map of property name to typed value
            CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_edited_at TEXT NOT NULL,
                properties TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_last_edited ON records(last_edited_at);
            ",
        )?;
        Ok(())
    }

    /// Inserts a record authored by `author`, stamped with the current time.
    pub fn insert_record(&self, fields: &Fields, author: Author) -> Result<Record, DbError> {
        self.insert_record_at(fields, author, Utc::now())
    }

    /// Inserts a record with an explicit creation time.
    pub fn insert_record_at(
        &self,
        fields: &Fields,
        author: Author,
        at: DateTime<Utc>,
    ) -> Result<Record, DbError> {
        let id = Uuid::new_v4().to_string();
        let properties: BTreeMap<String, PropertyValue> = fields.clone().into_iter().collect();
        let json = encode_properties(&id, &properties)?;
        let stamp = format_timestamp(at);
        self.conn.execute(
            "
            INSERT INTO records (id, created_by, created_at, last_edited_at, properties)
            VALUES (?, ?, ?, ?, ?)
            ",
            params![id, author.as_str(), stamp, stamp, json],
        )?;
        tracing::debug!(record = %id, %author, "inserted record");
        self.get_record(&id)?.ok_or(DbError::NotFound(id))
    }

    /// Merges `fields` into a record's properties and stamps the edit time.
    pub fn update_record_at(
        &self,
        id: &RecordId,
        fields: &Fields,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let tx = self.conn.unchecked_transaction()?;
        let stored: Option<String> = tx
            .query_row(
                "SELECT properties FROM records WHERE id = ?",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(stored) = stored else {
            return Err(DbError::NotFound(id.to_string()));
        };
        let mut properties = decode_properties(id.as_str(), &stored)?;
        for (name, value) in fields.iter() {
            properties.insert(name.clone(), value.clone());
        }
        tx.execute(
            "UPDATE records SET properties = ?, last_edited_at = ? WHERE id = ?",
            params![
                encode_properties(id.as_str(), &properties)?,
                format_timestamp(at),
                id.as_str()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Fetches one record by ID.
    pub fn get_record(&self, id: &str) -> Result<Option<Record>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT id, created_by, created_at, last_edited_at, properties
                FROM records
                WHERE id = ?
                ",
                [id],
                RawRecord::from_row,
            )
            .optional()?;
        row.map(RawRecord::into_record).transpose()
    }

    /// Lists all records in insertion order.
    pub fn list_records(&self) -> Result<Vec<Record>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, created_by, created_at, last_edited_at, properties
            FROM records
            ORDER BY seq ASC
            ",
        )?;
        let rows = stmt.query_map([], RawRecord::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}

impl RecordStore for Database {
    fn query_all(&self, sort_by: &str) -> Result<Vec<Record>, StoreError> {
        let mut records = self.list_records()?;
        // Stable: same-date records keep insertion order. Undated records sort last.
        records.sort_by_key(|r| {
            r.date(sort_by)
                .ok()
                .flatten()
                .map_or(DateTime::<Utc>::MAX_UTC, |d| d.instant())
        });
        Ok(records)
    }

    fn query_filtered(&self, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        let mut records = self.list_records()?;
        records.retain(|r| filter.matches(r));
        Ok(records)
    }

    fn create_record(&self, fields: &Fields) -> Result<Record, StoreError> {
        Ok(self.insert_record(fields, Author::Automation)?)
    }

    fn update_record(&self, id: &RecordId, fields: &Fields) -> Result<(), StoreError> {
        Ok(self.update_record_at(id, fields, Utc::now())?)
    }
}

/// A row as stored, before validation.
struct RawRecord {
    id: String,
    created_by: String,
    created_at: String,
    last_edited_at: String,
    properties: String,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_by: row.get(1)?,
            created_at: row.get(2)?,
            last_edited_at: row.get(3)?,
            properties: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<Record, DbError> {
        let invalid = |message: String| DbError::InvalidRecord {
            record_id: self.id.clone(),
            message,
        };
        let created_by: Author = self
            .created_by
            .parse()
            .map_err(|e: ct_core::ValidationError| invalid(e.to_string()))?;
        let created_at = parse_timestamp(&self.created_at, &self.id)?;
        let last_edited_at = parse_timestamp(&self.last_edited_at, &self.id)?;
        let properties = decode_properties(&self.id, &self.properties)?;
        let id = RecordId::new(self.id.clone()).map_err(|e| invalid(e.to_string()))?;
        Ok(Record {
            id,
            properties,
            created_by,
            created_at,
            last_edited_at,
        })
    }
}

fn encode_properties(
    record_id: &str,
    properties: &BTreeMap<String, PropertyValue>,
) -> Result<String, DbError> {
    serde_json::to_string(properties).map_err(|source| DbError::Properties {
        record_id: record_id.to_string(),
        source,
    })
}

fn decode_properties(
    record_id: &str,
    json: &str,
) -> Result<BTreeMap<String, PropertyValue>, DbError> {
    serde_json::from_str(json).map_err(|source| DbError::Properties {
        record_id: record_id.to_string(),
        source,
    })
}

fn parse_timestamp(timestamp: &str, record_id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            record_id: record_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
