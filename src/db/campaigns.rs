//! Campaign CRUD and status transitions.

use crate::error::{CampaignError, DatabaseError};
use crate::types::CampaignStatus;
use crate::{Error, Result};

use super::{Campaign, Database, NewCampaign};

impl Database {
    /// Insert a new campaign in pending status
    pub async fn insert_campaign(&self, campaign: &NewCampaign) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO campaigns (content_type, text, media_ref, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&campaign.content_type)
        .bind(&campaign.text)
        .bind(&campaign.media_ref)
        .bind(CampaignStatus::Pending.to_i32())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert campaign: {}",
                e
            )))
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Get a campaign by ID
    pub async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        let row = sqlx::query_as::<_, Campaign>(
            r#"
            SELECT
                id, content_type, text, media_ref, status,
                total_recipients, sent_count, failed_count,
                created_at, completed_at
            FROM campaigns
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get campaign: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a campaign by ID, failing when it does not exist
    pub async fn require_campaign(&self, id: i64) -> Result<Campaign> {
        self.get_campaign(id)
            .await?
            .ok_or(Error::Campaign(CampaignError::NotFound { id }))
    }

    /// Mark a campaign as processing and record the recipient total
    pub async fn start_campaign(&self, id: i64, total_recipients: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET status = ?, total_recipients = ?
            WHERE id = ?
            "#,
        )
        .bind(CampaignStatus::Processing.to_i32())
        .bind(total_recipients)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to start campaign: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Persist running counters mid-dispatch
    ///
    /// Called every checkpoint interval so a crash loses at most one
    /// interval's worth of counter updates (the ledger itself is written per
    /// delivery and loses nothing).
    pub async fn checkpoint_campaign(&self, id: i64, sent: i64, failed: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET sent_count = ?, failed_count = ?
            WHERE id = ?
            "#,
        )
        .bind(sent)
        .bind(failed)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to checkpoint campaign: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Mark a campaign completed with final counters
    ///
    /// Completed is terminal; the dispatcher never transitions a campaign
    /// back out of it.
    pub async fn complete_campaign(&self, id: i64, sent: i64, failed: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE campaigns
            SET status = ?, sent_count = ?, failed_count = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(CampaignStatus::Completed.to_i32())
        .bind(sent)
        .bind(failed)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to complete campaign: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Update campaign content after an edit pass
    pub async fn update_campaign_content(
        &self,
        id: i64,
        content_type: &str,
        text: &str,
        media_ref: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET content_type = ?, text = ?, media_ref = ?
            WHERE id = ?
            "#,
        )
        .bind(content_type)
        .bind(text)
        .bind(media_ref)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update campaign content: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// List campaigns stuck in processing status
    ///
    /// Used at startup to resume dispatches interrupted by a crash.
    pub async fn list_interrupted_campaigns(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, Campaign>(
            r#"
            SELECT
                id, content_type, text, media_ref, status,
                total_recipients, sent_count, failed_count,
                created_at, completed_at
            FROM campaigns
            WHERE status = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(CampaignStatus::Processing.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list interrupted campaigns: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
