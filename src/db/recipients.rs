//! Recipient registry.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Register a recipient, idempotently
    pub async fn register_recipient(&self, id: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT OR IGNORE INTO recipients (id, registered_at) VALUES (?, ?)")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to register recipient: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Remove a recipient from the registry
    ///
    /// Called when the transport reports the recipient permanently
    /// unreachable, so later campaigns stop trying.
    pub async fn remove_recipient(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM recipients WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to remove recipient: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// All registered recipients in registration order
    pub async fn list_recipients(&self) -> Result<Vec<i64>> {
        let rows: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM recipients ORDER BY registered_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to list recipients: {}",
                        e
                    )))
                })?;

        Ok(rows)
    }

    /// Number of registered recipients
    pub async fn count_recipients(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipients")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count recipients: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
