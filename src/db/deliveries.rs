//! Per-recipient delivery ledger.

use crate::error::DatabaseError;
use crate::{Error, Result};
use std::collections::HashSet;

use super::{Database, DeliveryRecord};

impl Database {
    /// Record one successful delivery
    ///
    /// `INSERT OR REPLACE` keeps the call idempotent: re-recording the same
    /// `(campaign, recipient)` pair after a resume overwrites rather than
    /// duplicating.
    pub async fn record_delivery(
        &self,
        campaign_id: i64,
        recipient: i64,
        message_id: i64,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO deliveries (campaign_id, recipient, message_id, delivered_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(campaign_id)
        .bind(recipient)
        .bind(message_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record delivery: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Recipients already served for a campaign
    ///
    /// A resumed dispatch subtracts this set from the recipient list.
    pub async fn delivered_recipients(&self, campaign_id: i64) -> Result<HashSet<i64>> {
        let rows: Vec<i64> =
            sqlx::query_scalar("SELECT recipient FROM deliveries WHERE campaign_id = ?")
                .bind(campaign_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to list delivered recipients: {}",
                        e
                    )))
                })?;

        Ok(rows.into_iter().collect())
    }

    /// Full ledger for a campaign, used by edit and delete passes
    pub async fn list_deliveries(&self, campaign_id: i64) -> Result<Vec<DeliveryRecord>> {
        let rows = sqlx::query_as::<_, DeliveryRecord>(
            r#"
            SELECT campaign_id, recipient, message_id, delivered_at
            FROM deliveries
            WHERE campaign_id = ?
            ORDER BY delivered_at ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list deliveries: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Remove one ledger row after its message was deleted from the platform
    pub async fn remove_delivery(&self, campaign_id: i64, recipient: i64) -> Result<()> {
        sqlx::query("DELETE FROM deliveries WHERE campaign_id = ? AND recipient = ?")
            .bind(campaign_id)
            .bind(recipient)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to remove delivery: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Drop the whole ledger for a campaign
    pub async fn clear_deliveries(&self, campaign_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM deliveries WHERE campaign_id = ?")
            .bind(campaign_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear deliveries: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }
}
