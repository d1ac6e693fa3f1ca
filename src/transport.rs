//! Delivery transport boundary
//!
//! The orchestrator never talks to a chat platform directly; embedders
//! implement [`ChatTransport`] over their platform client. The fan-out
//! dispatcher and the fetch delivery path both go through this trait, so
//! every outward side effect of the crate is mockable in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ArtifactRef, MediaContent};

/// A message successfully placed on the platform
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    /// Platform-side message id, recorded in the delivery ledger so the
    /// message can later be edited or deleted
    pub message_id: i64,
    /// Durable platform-side file handle for the uploaded media, when the
    /// platform returns one. Cached so repeat deliveries skip re-upload.
    pub remote_ref: Option<String>,
}

/// Per-delivery transport failure
#[derive(Debug, Error)]
pub enum TransportError {
    /// The recipient cannot be reached (blocked the sender, deactivated).
    /// Permanent for this recipient; the dispatcher counts it and moves on.
    #[error("recipient {recipient} unreachable: {reason}")]
    RecipientUnreachable {
        /// Recipient identity on the transport
        recipient: i64,
        /// Platform-reported reason
        reason: String,
    },

    /// The referenced message no longer exists (already deleted by the
    /// recipient or the platform). Treated as success by delete, as a
    /// counted failure by edit.
    #[error("message {message_id} not found for recipient {recipient}")]
    MessageNotFound {
        /// Recipient identity on the transport
        recipient: i64,
        /// The missing platform-side message id
        message_id: i64,
    },

    /// Platform-side rate limit; transient
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the platform asked us to back off
        retry_after_secs: u64,
    },

    /// Anything else (network failure, platform outage); transient
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// True for failures worth retrying on the same recipient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::RateLimited { .. } | TransportError::Other(_)
        )
    }
}

/// Result alias for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Outward boundary to the chat platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a message (text or media with caption) to one recipient
    async fn send(
        &self,
        recipient: i64,
        content: &MediaContent,
        text: &str,
    ) -> TransportResult<SentMessage>;

    /// Edit an existing message in place
    ///
    /// Only valid when the media type is unchanged; a type-changing edit is
    /// expressed by the caller as delete followed by send.
    async fn edit(
        &self,
        recipient: i64,
        message_id: i64,
        content: &MediaContent,
        text: &str,
    ) -> TransportResult<()>;

    /// Delete an existing message
    async fn delete(&self, recipient: i64, message_id: i64) -> TransportResult<()>;

    /// Deliver a fetched artifact (video/audio file) to its requester
    async fn send_artifact(
        &self,
        recipient: i64,
        artifact: &ArtifactRef,
        caption: Option<&str>,
    ) -> TransportResult<SentMessage>;

    /// Notify a requester with a plain status text (failure explanations,
    /// duplicate rejections)
    async fn notify(&self, recipient: i64, text: &str) -> TransportResult<()>;
}
