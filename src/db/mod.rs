//! Database layer for mediaq
//!
//! Handles SQLite persistence for broadcast campaigns, the per-recipient
//! delivery ledger, and the recipient registry.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`campaigns`] — Campaign CRUD and status transitions
//! - [`deliveries`] — Per-recipient delivery ledger (resume support)
//! - [`recipients`] — Recipient registry

use sqlx::{FromRow, sqlite::SqlitePool};

mod campaigns;
mod deliveries;
mod migrations;
mod recipients;

/// New campaign to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewCampaign {
    /// Content type label ("text", "photo", "video", "animation")
    pub content_type: String,
    /// Message text or media caption
    pub text: String,
    /// Serialized media reference (JSON), None for text-only campaigns
    pub media_ref: Option<String>,
}

/// Campaign record from database
#[derive(Debug, Clone, FromRow)]
pub struct Campaign {
    /// Unique database ID
    pub id: i64,
    /// Content type label ("text", "photo", "video", "animation")
    pub content_type: String,
    /// Message text or media caption
    pub text: String,
    /// Serialized media reference (JSON), None for text-only campaigns
    pub media_ref: Option<String>,
    /// Current status (0=pending, 1=processing, 2=completed)
    pub status: i32,
    /// Recipient count at dispatch time
    pub total_recipients: i64,
    /// Number of successful deliveries so far
    pub sent_count: i64,
    /// Number of failed deliveries so far
    pub failed_count: i64,
    /// Unix timestamp when the campaign was created
    pub created_at: i64,
    /// Unix timestamp when the campaign completed
    pub completed_at: Option<i64>,
}

/// One row of the delivery ledger
///
/// Recorded after every successful send; the `(campaign, recipient)` pair is
/// unique, which is what makes a resumed dispatch skip already-served
/// recipients.
#[derive(Debug, Clone, FromRow)]
pub struct DeliveryRecord {
    /// Campaign this delivery belongs to
    pub campaign_id: i64,
    /// Recipient identity on the transport
    pub recipient: i64,
    /// Platform-side message id, used by later edit/delete passes
    pub message_id: i64,
    /// Unix timestamp of the delivery
    pub delivered_at: i64,
}

/// Recipient registry record
#[derive(Debug, Clone, FromRow)]
pub struct Recipient {
    /// Recipient identity on the transport
    pub id: i64,
    /// Unix timestamp of registration
    pub registered_at: i64,
}

/// Database handle for mediaq
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
