//! Resource and reaction records.

use crate::error::DatabaseError;
use crate::store::{Collection, NewReaction, NewRecord};
use crate::{Error, Result};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;

use super::{Database, ReactionMeta, RecordMeta, insert_error, query_error};

fn reaction_table(parent: Collection) -> Result<&'static str> {
    parent.reaction_table().ok_or_else(|| {
        Error::Database(DatabaseError::ConstraintViolation(format!(
            "{} records do not carry reactions",
            parent
        )))
    })
}

// Static so the row stream can outlive the call
fn scan_sql(collection: Collection) -> &'static str {
    match collection {
        Collection::Issues => "SELECT body FROM issues ORDER BY id",
        Collection::Comments => "SELECT body FROM comments ORDER BY id",
        Collection::Labels => "SELECT body FROM labels ORDER BY id",
    }
}

impl Database {
    /// Whether a record with this id is committed
    pub async fn record_exists(&self, collection: Collection, id: i64) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?", collection.name());
        let found: Option<i64> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error(e, "check record presence"))?;
        Ok(found.is_some())
    }

    /// Insert a record; body and presence are committed by one statement
    pub async fn insert_record(&self, record: &NewRecord) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO {} (id, created_at, body, archived_at) VALUES (?, ?, ?, ?)",
            record.collection.name()
        );
        sqlx::query(&sql)
            .bind(record.id)
            .bind(record.created_at.map(|t| t.timestamp()))
            .bind(&record.body[..])
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(e, &format!("{} {}", record.collection, record.id)))?;

        tracing::debug!(collection = %record.collection, id = record.id, bytes = record.body.len(), "record committed");
        Ok(())
    }

    /// Whether a reaction with this id is committed under the given parent collection
    pub async fn reaction_exists(&self, parent: Collection, id: i64) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?", reaction_table(parent)?);
        let found: Option<i64> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error(e, "check reaction presence"))?;
        Ok(found.is_some())
    }

    /// Insert a reaction; the foreign key rejects a parent that is not committed
    pub async fn insert_reaction(&self, reaction: &NewReaction) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO {} (id, parent_id, created_at, body, archived_at) VALUES (?, ?, ?, ?, ?)",
            reaction_table(reaction.parent)?
        );
        sqlx::query(&sql)
            .bind(reaction.id)
            .bind(reaction.parent_id)
            .bind(reaction.created_at.map(|t| t.timestamp()))
            .bind(&reaction.body[..])
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                insert_error(
                    e,
                    &format!(
                        "reaction {} on {} {}",
                        reaction.id, reaction.parent, reaction.parent_id
                    ),
                )
            })?;
        Ok(())
    }

    /// Number of committed reactions under one parent
    pub async fn reaction_count(&self, parent: Collection, parent_id: i64) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE parent_id = ?",
            reaction_table(parent)?
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(parent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_error(e, "count reactions"))?;
        Ok(count as u64)
    }

    /// Stream the bodies of a collection in id order
    pub fn scan_bodies(&self, collection: Collection) -> BoxStream<'_, Result<Bytes>> {
        sqlx::query_scalar::<_, Vec<u8>>(scan_sql(collection))
            .fetch(&self.pool)
            .map(|row| {
                row.map(Bytes::from)
                    .map_err(|e| query_error(e, "scan record bodies"))
            })
            .boxed()
    }

    /// Number of committed records in a collection
    pub async fn count_records(&self, collection: Collection) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", collection.name());
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_error(e, "count records"))?;
        Ok(count as u64)
    }

    /// Number of committed reactions across every parent in a collection
    pub async fn count_reactions(&self, parent: Collection) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", reaction_table(parent)?);
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_error(e, "count reactions"))?;
        Ok(count as u64)
    }

    /// Ids and timestamps of every record in a collection, in id order
    pub async fn record_index(&self, collection: Collection) -> Result<Vec<RecordMeta>> {
        let sql = format!(
            "SELECT id, created_at FROM {} ORDER BY id",
            collection.name()
        );
        sqlx::query_as::<_, RecordMeta>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error(e, "list records"))
    }

    /// Body of one committed record
    pub async fn record_body(&self, collection: Collection, id: i64) -> Result<Bytes> {
        let sql = format!("SELECT body FROM {} WHERE id = ?", collection.name());
        let body: Option<Vec<u8>> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error(e, "read record body"))?;
        body.map(Bytes::from).ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!("{} {}", collection, id)))
        })
    }

    /// Ids, parents and timestamps of every reaction under a collection
    pub async fn reaction_index(&self, parent: Collection) -> Result<Vec<ReactionMeta>> {
        let sql = format!(
            "SELECT id, parent_id, created_at FROM {} ORDER BY parent_id, id",
            reaction_table(parent)?
        );
        sqlx::query_as::<_, ReactionMeta>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error(e, "list reactions"))
    }

    /// Body of one committed reaction
    pub async fn reaction_body(&self, parent: Collection, id: i64) -> Result<Bytes> {
        let sql = format!("SELECT body FROM {} WHERE id = ?", reaction_table(parent)?);
        let body: Option<Vec<u8>> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error(e, "read reaction body"))?;
        body.map(Bytes::from).ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "reaction {} on {}",
                id, parent
            )))
        })
    }
}
