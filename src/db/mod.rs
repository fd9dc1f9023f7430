//! Database layer for issue-archive
//!
//! SQLite persistence for archived records. Each collection is one table of
//! `(id, created_at, body)`; reactions live in per-parent tables with a foreign
//! key to their parent; fetched assets live in `files`, keyed by source URL.
//! Every insert is a single statement, so SQLite's own atomicity gives the
//! store its crash consistency.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations, compaction
//! - [`records`] - Resource and reaction records
//! - [`files`] - Fetched assets
//! - [`state`] - Runtime state (which repository this store belongs to)

use crate::error::{DatabaseError, Error, Result};
use crate::store::{Collection, NewFile, NewReaction, NewRecord, RecordStore};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use sqlx::{FromRow, sqlite::SqlitePool};
use std::collections::HashSet;

mod files;
mod migrations;
mod records;
mod state;

/// Index entry for a committed resource record (body not loaded)
#[derive(Debug, Clone, FromRow)]
pub struct RecordMeta {
    /// Remote numeric id
    pub id: i64,
    /// Unix timestamp of the record's creation, if known
    pub created_at: Option<i64>,
}

/// Index entry for a committed reaction (body not loaded)
#[derive(Debug, Clone, FromRow)]
pub struct ReactionMeta {
    /// Remote reaction id
    pub id: i64,
    /// Id of the parent record
    pub parent_id: i64,
    /// Unix timestamp of the reaction, if known
    pub created_at: Option<i64>,
}

/// Index entry for a committed file (body not loaded)
#[derive(Debug, Clone, FromRow)]
pub struct FileMeta {
    /// Source URL
    pub url: String,
    /// Destination components, JSON-encoded array of strings
    pub destination: String,
    /// Unix timestamp from the origin's `Last-Modified`, if any
    pub last_modified: Option<i64>,
}

impl FileMeta {
    /// Decode the destination path components
    pub fn destination(&self) -> Result<Vec<String>> {
        Ok(serde_json::from_str(&self.destination)?)
    }
}

/// Database handle for issue-archive
pub struct Database {
    pool: SqlitePool,
}

/// Map an insert failure, classifying key and foreign-key conflicts as constraint violations
fn insert_error(e: sqlx::Error, what: &str) -> Error {
    if let sqlx::Error::Database(db_err) = &e
        && (db_err.is_unique_violation()
            || db_err.is_foreign_key_violation()
            || db_err.message().contains("constraint failed"))
    {
        return Error::Database(DatabaseError::ConstraintViolation(format!(
            "{}: {}",
            what,
            db_err.message()
        )));
    }
    Error::Database(DatabaseError::QueryFailed(format!(
        "Failed to insert {}: {}",
        what, e
    )))
}

fn query_error(e: sqlx::Error, what: &str) -> Error {
    Error::Database(DatabaseError::QueryFailed(format!("Failed to {}: {}", what, e)))
}

#[async_trait]
impl RecordStore for Database {
    async fn exists(&self, collection: Collection, id: i64) -> Result<bool> {
        self.record_exists(collection, id).await
    }

    async fn insert(&self, record: &NewRecord) -> Result<()> {
        self.insert_record(record).await
    }

    async fn reaction_exists(&self, parent: Collection, id: i64) -> Result<bool> {
        Database::reaction_exists(self, parent, id).await
    }

    async fn insert_reaction(&self, reaction: &NewReaction) -> Result<()> {
        Database::insert_reaction(self, reaction).await
    }

    async fn reaction_count(&self, parent: Collection, parent_id: i64) -> Result<u64> {
        Database::reaction_count(self, parent, parent_id).await
    }

    async fn insert_file(&self, file: &NewFile) -> Result<()> {
        Database::insert_file(self, file).await
    }

    async fn file_urls(&self) -> Result<HashSet<String>> {
        Database::file_urls(self).await
    }

    fn scan_bodies(&self, collection: Collection) -> BoxStream<'_, Result<Bytes>> {
        Database::scan_bodies(self, collection)
    }
}
