//! Opens the configured record store.

use std::fmt;

use anyhow::{Context, Result};
use ct_core::{Fields, Filter, Record, RecordId, RecordStore, StoreError};
use ct_db::Database;
use ct_notion::{Client, NotionStore};

use crate::config::{Backend, Config};

/// The record store selected by configuration.
pub enum Store {
    Sqlite(Database),
    Notion(NotionStore),
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(_) => f.write_str("Store::Sqlite"),
            Self::Notion(store) => f.debug_tuple("Store::Notion").field(store).finish(),
        }
    }
}

impl Store {
    /// Opens the backend named in `config`, creating the database directory if needed.
    pub fn open(config: &Config) -> Result<Self> {
        match config.backend {
            Backend::Sqlite => {
                if let Some(parent) = config.database_path.parent() {
                    std::fs::create_dir_all(parent)
                        .context("failed to create database directory")?;
                }
                let db = Database::open(&config.database_path).with_context(|| {
                    format!("failed to open {}", config.database_path.display())
                })?;
                Ok(Self::Sqlite(db))
            }
            Backend::Notion => {
                let token = config
                    .notion
                    .token
                    .as_deref()
                    .context("notion.token is required for the notion backend")?;
                let database_id = config
                    .notion
                    .database_id
                    .as_deref()
                    .context("notion.database_id is required for the notion backend")?;
                let client = Client::new(token).context("invalid Notion token")?;
                let store = NotionStore::new(client, database_id)
                    .context("failed to set up the Notion store")?;
                Ok(Self::Notion(store))
            }
        }
    }

    /// The local database, when that is the backend.
    pub const fn database(&self) -> Option<&Database> {
        match self {
            Self::Sqlite(db) => Some(db),
            Self::Notion(_) => None,
        }
    }
}

impl RecordStore for Store {
    fn query_all(&self, sort_by: &str) -> Result<Vec<Record>, StoreError> {
        match self {
            Self::Sqlite(db) => db.query_all(sort_by),
            Self::Notion(store) => store.query_all(sort_by),
        }
    }

    fn query_filtered(&self, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        match self {
            Self::Sqlite(db) => db.query_filtered(filter),
            Self::Notion(store) => store.query_filtered(filter),
        }
    }

    fn create_record(&self, fields: &Fields) -> Result<Record, StoreError> {
        match self {
            Self::Sqlite(db) => db.create_record(fields),
            Self::Notion(store) => store.create_record(fields),
        }
    }

    fn update_record(&self, id: &RecordId, fields: &Fields) -> Result<(), StoreError> {
        match self {
            Self::Sqlite(db) => db.update_record(id, fields),
            Self::Notion(store) => store.update_record(id, fields),
        }
    }
}
