//! Runtime state: which repository a store belongs to, when it last completed.

use crate::config::Repository;
use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

const REPOSITORY_KEY: &str = "repository";
const LAST_COMPLETED_KEY: &str = "last_completed";

impl Database {
    /// Bind this store to a repository, or check that it already belongs to it
    ///
    /// The first run records `owner/repo`. Resuming a store with a different
    /// repository is a configuration error: its records would be skipped as
    /// already present by id.
    pub async fn claim_repository(&self, repository: &Repository) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let name = repository.to_string();

        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(REPOSITORY_KEY)
        .bind(&name)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record repository: {}",
                e
            )))
        })?;

        match self.repository().await? {
            Some(stored) if stored.eq_ignore_ascii_case(&name) => Ok(()),
            Some(stored) => Err(Error::Config {
                message: format!("store belongs to {}, not {}", stored, name),
                key: Some("repository".to_string()),
            }),
            None => Err(Error::Database(DatabaseError::NotFound(
                "repository binding".to_string(),
            ))),
        }
    }

    /// The `owner/repo` this store was created for
    pub async fn repository(&self) -> Result<Option<String>> {
        self.get_state(REPOSITORY_KEY).await
    }

    /// Record that a run finished every phase
    pub async fn set_last_completed(&self, at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(LAST_COMPLETED_KEY)
        .bind(at.timestamp().to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record completion: {}",
                e
            )))
        })?;
        Ok(())
    }

    /// When a run last finished every phase
    pub async fn last_completed(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        Ok(self
            .get_state(LAST_COMPLETED_KEY)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0)))
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to read runtime state {}: {}",
                    key, e
                )))
            })
    }
}
