//! Rate-limited broadcast fan-out
//!
//! Drives campaign send, edit, and delete-all operations against the chat
//! transport. One recipient's failure never aborts a batch: failures are
//! counted and the iteration continues. Every successful send appends to
//! the delivery ledger, which is what later edit/delete passes replay and
//! what a resumed dispatch uses to skip already-served recipients.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::FanoutConfig;
use crate::db::{Campaign, Database};
use crate::error::{CampaignError, Error, Result};
use crate::transport::{ChatTransport, TransportError};
use crate::types::{ArtifactRef, CampaignStatus, Event, MediaContent};

/// Final counters of a completed fan-out pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FanoutSummary {
    /// Successful deliveries in this pass
    pub sent: i64,
    /// Failed deliveries in this pass
    pub failed: i64,
}

/// Executes broadcast campaigns against the transport
pub struct FanoutDispatcher {
    db: Arc<Database>,
    transport: Arc<dyn ChatTransport>,
    config: FanoutConfig,
    event_tx: broadcast::Sender<Event>,
}

impl FanoutDispatcher {
    /// Create a dispatcher over the database and transport
    pub fn new(
        db: Arc<Database>,
        transport: Arc<dyn ChatTransport>,
        config: FanoutConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            db,
            transport,
            config,
            event_tx,
        }
    }

    /// Send a campaign to every registered recipient
    ///
    /// Resumable: recipients already present in the delivery ledger are
    /// skipped, so re-running an interrupted campaign serves only the
    /// remainder. Completed campaigns are rejected rather than re-sent.
    pub async fn run_send(&self, campaign_id: i64) -> Result<FanoutSummary> {
        let campaign = self.db.require_campaign(campaign_id).await?;
        if CampaignStatus::from_i32(campaign.status) == CampaignStatus::Completed {
            return Err(Error::Campaign(CampaignError::InvalidStatus {
                id: campaign_id,
                operation: "send".into(),
                status: "completed".into(),
            }));
        }
        let content = campaign_content(&campaign)?;

        let recipients = self.db.list_recipients().await?;
        let already_served = self.db.delivered_recipients(campaign_id).await?;
        self.db
            .start_campaign(campaign_id, recipients.len() as i64)
            .await?;

        // resuming keeps the counters accumulated before the interruption
        let mut sent = campaign.sent_count;
        let mut failed = campaign.failed_count;
        let mut processed: u32 = 0;

        tracing::info!(
            campaign_id,
            recipients = recipients.len(),
            resumed = already_served.len(),
            "Starting campaign dispatch"
        );

        for recipient in recipients {
            if already_served.contains(&recipient) {
                continue;
            }

            let outcome = self
                .with_timeout(self.transport.send(recipient, &content, &campaign.text))
                .await;

            match outcome {
                Ok(message) => {
                    self.db
                        .record_delivery(campaign_id, recipient, message.message_id)
                        .await?;
                    sent += 1;
                }
                Err(e) => {
                    failed += 1;
                    self.handle_delivery_failure(campaign_id, recipient, &e).await;
                }
            }

            processed += 1;
            if processed % self.config.checkpoint_every == 0 {
                self.db.checkpoint_campaign(campaign_id, sent, failed).await?;
            }

            tokio::time::sleep(self.config.send_delay).await;
        }

        self.db.complete_campaign(campaign_id, sent, failed).await?;
        let _ = self.event_tx.send(Event::CampaignCompleted {
            campaign_id,
            sent: sent.max(0) as u32,
            failed: failed.max(0) as u32,
        });
        tracing::info!(campaign_id, sent, failed, "Campaign dispatch complete");

        Ok(FanoutSummary { sent, failed })
    }

    /// Edit every delivered message of a completed campaign
    ///
    /// A text-only change (or same-type media swap) edits in place. A
    /// media-type change is expressed as delete-then-resend, because not
    /// every transport can mutate a message's media type; the new message
    /// id overwrites the ledger row so later passes target the new message.
    pub async fn run_edit(
        &self,
        campaign_id: i64,
        new_text: &str,
        new_media: Option<&MediaContent>,
    ) -> Result<FanoutSummary> {
        let campaign = self.db.require_campaign(campaign_id).await?;
        if CampaignStatus::from_i32(campaign.status) != CampaignStatus::Completed {
            return Err(Error::Campaign(CampaignError::InvalidStatus {
                id: campaign_id,
                operation: "edit".into(),
                status: CampaignStatus::from_i32(campaign.status).label().into(),
            }));
        }

        let old_content = campaign_content(&campaign)?;
        let content = match new_media {
            Some(media) => media.clone(),
            None => old_content.clone(),
        };
        let type_changed = content.type_label() != old_content.type_label();

        let ledger = self.db.list_deliveries(campaign_id).await?;
        let mut edited = 0i64;
        let mut failed = 0i64;

        tracing::info!(
            campaign_id,
            messages = ledger.len(),
            type_changed,
            "Starting campaign edit pass"
        );

        for record in ledger {
            let outcome = if type_changed {
                self.replace_message(campaign_id, &record, &content, new_text)
                    .await
            } else {
                self.with_timeout(self.transport.edit(
                    record.recipient,
                    record.message_id,
                    &content,
                    new_text,
                ))
                .await
                .map(|_| ())
            };

            match outcome {
                Ok(()) => edited += 1,
                Err(e) => {
                    failed += 1;
                    tracing::debug!(
                        campaign_id,
                        recipient = record.recipient,
                        error = %e,
                        "Edit failed for one recipient"
                    );
                }
            }

            tokio::time::sleep(self.config.send_delay).await;
        }

        let media_ref = media_ref_json(&content)?;
        self.db
            .update_campaign_content(
                campaign_id,
                content.type_label(),
                new_text,
                media_ref.as_deref(),
            )
            .await?;

        tracing::info!(campaign_id, edited, failed, "Campaign edit pass complete");
        Ok(FanoutSummary {
            sent: edited,
            failed,
        })
    }

    /// Delete every delivered message of a campaign
    ///
    /// Idempotent: already-deleted messages count as success and their
    /// ledger rows are removed, so a second pass finds an empty ledger.
    pub async fn run_delete_all(&self, campaign_id: i64) -> Result<FanoutSummary> {
        // existence check only; any status may be deleted
        self.db.require_campaign(campaign_id).await?;
        let ledger = self.db.list_deliveries(campaign_id).await?;
        let mut deleted = 0i64;
        let mut failed = 0i64;

        tracing::info!(campaign_id, messages = ledger.len(), "Starting delete-all pass");

        for record in ledger {
            let outcome = self
                .with_timeout(self.transport.delete(record.recipient, record.message_id))
                .await;

            match outcome {
                // a message the recipient already deleted is done either way
                Ok(()) | Err(TransportError::MessageNotFound { .. }) => {
                    self.db
                        .remove_delivery(campaign_id, record.recipient)
                        .await?;
                    deleted += 1;
                }
                Err(e) => {
                    failed += 1;
                    tracing::debug!(
                        campaign_id,
                        recipient = record.recipient,
                        error = %e,
                        "Delete failed for one recipient"
                    );
                }
            }

            tokio::time::sleep(self.config.delete_delay).await;
        }

        tracing::info!(campaign_id, deleted, failed, "Delete-all pass complete");
        Ok(FanoutSummary {
            sent: deleted,
            failed,
        })
    }

    /// Delete-then-resend for media-type-changing edits
    async fn replace_message(
        &self,
        campaign_id: i64,
        record: &crate::db::DeliveryRecord,
        content: &MediaContent,
        text: &str,
    ) -> std::result::Result<(), TransportError> {
        // tolerate an already-gone original; the resend is what matters
        match self
            .with_timeout(self.transport.delete(record.recipient, record.message_id))
            .await
        {
            Ok(()) | Err(TransportError::MessageNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        tokio::time::sleep(self.config.delete_delay).await;

        let message = self
            .with_timeout(self.transport.send(record.recipient, content, text))
            .await?;
        // overwrite so future operations target the replacement
        if let Err(e) = self
            .db
            .record_delivery(campaign_id, record.recipient, message.message_id)
            .await
        {
            tracing::error!(
                campaign_id,
                recipient = record.recipient,
                error = %e,
                "Replacement sent but ledger update failed"
            );
        }
        Ok(())
    }

    /// Per-recipient failure bookkeeping for sends
    async fn handle_delivery_failure(
        &self,
        campaign_id: i64,
        recipient: i64,
        error: &TransportError,
    ) {
        tracing::debug!(campaign_id, recipient, error = %error, "Delivery failed");
        // permanently unreachable recipients are dropped from the registry
        // so later campaigns stop trying them
        if let TransportError::RecipientUnreachable { .. } = error
            && let Err(e) = self.db.remove_recipient(recipient).await
        {
            tracing::warn!(recipient, error = %e, "Failed to deregister unreachable recipient");
        }
    }

    async fn with_timeout<T>(
        &self,
        action: impl std::future::Future<Output = std::result::Result<T, TransportError>>,
    ) -> std::result::Result<T, TransportError> {
        tokio::time::timeout(self.config.delivery_timeout, action)
            .await
            .map_err(|_| {
                TransportError::Other(format!(
                    "delivery timed out after {}s",
                    self.config.delivery_timeout.as_secs()
                ))
            })?
    }
}

/// Rebuild the campaign's media content from its stored row
fn campaign_content(campaign: &Campaign) -> Result<MediaContent> {
    let artifact = match &campaign.media_ref {
        Some(raw) => Some(serde_json::from_str::<ArtifactRef>(raw)?),
        None => None,
    };
    match (campaign.content_type.as_str(), artifact) {
        ("text", _) => Ok(MediaContent::Text),
        ("photo", Some(a)) => Ok(MediaContent::Photo(a)),
        ("video", Some(a)) => Ok(MediaContent::Video(a)),
        ("animation", Some(a)) => Ok(MediaContent::Animation(a)),
        (other, _) => Err(Error::Other(format!(
            "campaign {} has unusable content ({other})",
            campaign.id
        ))),
    }
}

/// Serialize the media reference of a content value, None for plain text
fn media_ref_json(content: &MediaContent) -> Result<Option<String>> {
    let artifact = match content {
        MediaContent::Text => return Ok(None),
        MediaContent::Photo(a) | MediaContent::Video(a) | MediaContent::Animation(a) => a,
    };
    Ok(Some(serde_json::to_string(artifact)?))
}
