//! The durable record store interface
//!
//! The archiver only talks to storage through [`RecordStore`]. An implementation
//! must make each insert atomic: the body and the presence of its key become
//! visible together or not at all, so a presence check never observes a
//! half-written record. Inserting a key that already exists is a
//! [`ConstraintViolation`](crate::error::DatabaseError::ConstraintViolation).

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::collections::HashSet;
use std::fmt;

/// A named group of same-kind resource records
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Issues and pull requests
    Issues,
    /// Issue comments
    Comments,
    /// Repository labels
    Labels,
}

impl Collection {
    /// Every collection, in synchronization order
    pub const ALL: [Collection; 3] = [Collection::Issues, Collection::Comments, Collection::Labels];

    /// Short name, also the table name
    pub fn name(self) -> &'static str {
        match self {
            Collection::Issues => "issues",
            Collection::Comments => "comments",
            Collection::Labels => "labels",
        }
    }

    /// Table holding this collection's reactions, if the record type carries any
    pub fn reaction_table(self) -> Option<&'static str> {
        match self {
            Collection::Issues => Some("issue_reactions"),
            Collection::Comments => Some("comment_reactions"),
            Collection::Labels => None,
        }
    }

    /// Whether records carry a Markdown `body` and an author worth scanning for assets
    pub fn has_text_bodies(self) -> bool {
        !matches!(self, Collection::Labels)
    }

    /// Directory of this collection's entries inside a zip container
    pub fn archive_dir(self) -> &'static str {
        match self {
            Collection::Issues => "issues",
            Collection::Comments => "issues/comments",
            Collection::Labels => "labels",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resource record to be committed
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Collection the record belongs to
    pub collection: Collection,
    /// Remote numeric id
    pub id: i64,
    /// The record's own creation time, if it has one
    pub created_at: Option<DateTime<Utc>>,
    /// Raw JSON body as served by the API
    pub body: Bytes,
}

/// A reaction record to be committed under an already committed parent
#[derive(Debug, Clone)]
pub struct NewReaction {
    /// Collection of the parent record
    pub parent: Collection,
    /// Id of the parent record
    pub parent_id: i64,
    /// Remote reaction id
    pub id: i64,
    /// Reaction creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Raw JSON body
    pub body: Bytes,
}

/// A fetched asset to be committed
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Source URL, fragment stripped; the dedup key
    pub url: String,
    /// Destination path components inside a container
    pub destination: Vec<String>,
    /// `Last-Modified` reported by the origin
    pub last_modified: Option<DateTime<Utc>>,
    /// Raw bytes
    pub body: Bytes,
}

/// Key-addressed store of opaque bodies, grouped into collections
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether a record is fully committed
    async fn exists(&self, collection: Collection, id: i64) -> Result<bool>;

    /// Atomically commit a record; fails if the id is already present
    async fn insert(&self, record: &NewRecord) -> Result<()>;

    /// Whether a reaction under `parent` collection is committed
    async fn reaction_exists(&self, parent: Collection, id: i64) -> Result<bool>;

    /// Atomically commit a reaction; fails on a duplicate id or a missing parent
    async fn insert_reaction(&self, reaction: &NewReaction) -> Result<()>;

    /// Number of committed reactions for one parent record
    async fn reaction_count(&self, parent: Collection, parent_id: i64) -> Result<u64>;

    /// Atomically commit a file; fails if the URL is already present
    async fn insert_file(&self, file: &NewFile) -> Result<()>;

    /// Every committed file URL
    async fn file_urls(&self) -> Result<HashSet<String>>;

    /// Stream the committed bodies of a collection in id order
    fn scan_bodies(&self, collection: Collection) -> BoxStream<'_, Result<Bytes>>;
}
