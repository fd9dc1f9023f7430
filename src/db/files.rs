//! Fetched assets, keyed by source URL.

use crate::error::DatabaseError;
use crate::store::NewFile;
use crate::{Error, Result};
use bytes::Bytes;
use std::collections::HashSet;

use super::{Database, FileMeta, insert_error, query_error};

impl Database {
    /// Insert a fetched asset; fails if the URL was already stored
    pub async fn insert_file(&self, file: &NewFile) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let destination = serde_json::to_string(&file.destination)?;

        sqlx::query(
            r#"
            INSERT INTO files (url, destination, last_modified, body, archived_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&file.url)
        .bind(&destination)
        .bind(file.last_modified.map(|t| t.timestamp()))
        .bind(&file.body[..])
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, &format!("file {}", file.url)))?;

        tracing::debug!(url = %file.url, bytes = file.body.len(), "file committed");
        Ok(())
    }

    /// Every stored file URL
    pub async fn file_urls(&self) -> Result<HashSet<String>> {
        let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM files")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error(e, "list file urls"))?;
        Ok(urls.into_iter().collect())
    }

    /// Number of stored files
    pub async fn count_files(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_error(e, "count files"))?;
        Ok(count as u64)
    }

    /// Every stored file without its body, ordered by destination then URL
    pub async fn file_index(&self) -> Result<Vec<FileMeta>> {
        sqlx::query_as::<_, FileMeta>(
            "SELECT url, destination, last_modified FROM files ORDER BY destination, url",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error(e, "list files"))
    }

    /// Body of one stored file
    pub async fn file_body(&self, url: &str) -> Result<Bytes> {
        let body: Option<Vec<u8>> = sqlx::query_scalar("SELECT body FROM files WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error(e, "read file body"))?;
        body.map(Bytes::from)
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(format!("file {}", url))))
    }
}
