//! Core types for mediaq

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a submitted job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    /// Create a new JobId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<JobId> for i64 {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work accepted by the orchestrator
///
/// Each variant carries only the fields relevant to its kind and is matched
/// exhaustively by the worker. Fetch jobs identify a media target; broadcast
/// jobs reference a campaign persisted in the database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Job {
    /// Download a video and deliver it to the requester
    VideoFetch {
        /// Target URL
        url: String,
        /// Requester identity (chat/user id on the transport)
        requester: i64,
        /// Pre-selected format id from the selection menu, if the requester
        /// chose one; None lets the executor pick
        format_id: Option<String>,
        /// Requested container extension override (e.g. "mp4")
        output_ext: Option<String>,
    },

    /// Extract the audio track of a video and deliver it
    AudioFetch {
        /// Platform-side video identifier
        video_id: String,
        /// Requester identity
        requester: i64,
    },

    /// Send a broadcast campaign to every registered recipient
    BroadcastSend {
        /// Campaign database id
        campaign_id: i64,
    },

    /// Edit every delivered message of a completed campaign
    BroadcastEdit {
        /// Campaign database id
        campaign_id: i64,
        /// Replacement text or caption
        new_text: String,
        /// Replacement media; a media-type change forces delete-then-resend
        new_media: Option<MediaContent>,
    },

    /// Delete every delivered message of a campaign
    BroadcastDelete {
        /// Campaign database id
        campaign_id: i64,
    },
}

impl Job {
    /// Short kind label used in fingerprints, logs, and events
    pub fn kind(&self) -> &'static str {
        match self {
            Job::VideoFetch { .. } => "video",
            Job::AudioFetch { .. } => "audio",
            Job::BroadcastSend { .. } => "broadcast_send",
            Job::BroadcastEdit { .. } => "broadcast_edit",
            Job::BroadcastDelete { .. } => "broadcast_delete",
        }
    }
}

/// Media payload of a broadcast campaign or delivery
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaContent {
    /// Plain text message
    Text,
    /// Photo, by local path or durable remote reference
    Photo(ArtifactRef),
    /// Video, by local path or durable remote reference
    Video(ArtifactRef),
    /// Animation/GIF, by local path or durable remote reference
    Animation(ArtifactRef),
}

impl MediaContent {
    /// Content-type label stored in the campaign row
    pub fn type_label(&self) -> &'static str {
        match self {
            MediaContent::Text => "text",
            MediaContent::Photo(_) => "photo",
            MediaContent::Video(_) => "video",
            MediaContent::Animation(_) => "animation",
        }
    }
}

/// Reference to a fetched artifact
///
/// `Remote` references are durable platform-side handles that survive local
/// disk wipes and are preferred over `Local` paths whenever both exist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ArtifactRef {
    /// Path on local scratch storage, valid only while the disk keeps it
    Local(PathBuf),
    /// Durable platform-side file handle, reusable across processes
    Remote(String),
}

impl ArtifactRef {
    /// True for durable remote references
    pub fn is_remote(&self) -> bool {
        matches!(self, ArtifactRef::Remote(_))
    }
}

/// Outcome of a submission attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitResult {
    /// Job accepted and queued
    Accepted(JobId),
    /// An identical job is already in flight; nothing was queued
    RejectedDuplicate,
}

/// Terminal state of a processed job
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// Work completed and the artifact (if any) was delivered
    Succeeded,
    /// Work failed with a classified user-facing category
    Failed(crate::error::FetchErrorKind),
    /// Another worker held the fingerprint lock; no work was performed
    SkippedDuplicate,
}

/// Broadcast campaign status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    /// Created, not yet dispatched
    Pending,
    /// Dispatcher is iterating the recipient set
    Processing,
    /// Terminal; counters are final. Never reverts.
    Completed,
}

impl CampaignStatus {
    /// Convert integer status code to CampaignStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => CampaignStatus::Pending,
            1 => CampaignStatus::Processing,
            // Unknown codes read as Completed so a corrupted row can never
            // be picked up for re-dispatch
            _ => CampaignStatus::Completed,
        }
    }

    /// Convert CampaignStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            CampaignStatus::Pending => 0,
            CampaignStatus::Processing => 1,
            CampaignStatus::Completed => 2,
        }
    }

    /// Lowercase label for logs and error messages
    pub fn label(&self) -> &'static str {
        match self {
            CampaignStatus::Pending => "pending",
            CampaignStatus::Processing => "processing",
            CampaignStatus::Completed => "completed",
        }
    }
}

/// Event emitted during job and campaign lifecycle
///
/// Events are observability for embedders (dashboards, logs); the
/// authoritative per-job notification channel is the progress sink supplied
/// at submission time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted into the queue
    JobQueued {
        /// Job ID
        id: JobId,
        /// Job kind label
        kind: String,
    },

    /// Submission rejected because the fingerprint is already in flight
    JobRejectedDuplicate {
        /// Job kind label
        kind: String,
        /// The contended fingerprint key
        fingerprint: String,
    },

    /// A worker started executing the job
    JobStarted {
        /// Job ID
        id: JobId,
    },

    /// Job reached a terminal state
    JobFinished {
        /// Job ID
        id: JobId,
        /// Terminal outcome label (succeeded/failed/skipped_duplicate)
        outcome: String,
    },

    /// Result cache satisfied a fetch without re-downloading
    CacheHit {
        /// Job ID
        id: JobId,
    },

    /// Broadcast campaign reached its terminal state
    CampaignCompleted {
        /// Campaign database id
        campaign_id: i64,
        /// Number of successful deliveries
        sent: u32,
        /// Number of failed deliveries
        failed: u32,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

impl JobOutcome {
    /// Label used in [`Event::JobFinished`]
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Failed(_) => "failed",
            JobOutcome::SkippedDuplicate => "skipped_duplicate",
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_status_round_trips_through_i32() {
        let cases = [
            (CampaignStatus::Pending, 0),
            (CampaignStatus::Processing, 1),
            (CampaignStatus::Completed, 2),
        ];
        for (variant, code) in cases {
            assert_eq!(variant.to_i32(), code);
            assert_eq!(CampaignStatus::from_i32(code), variant);
        }
    }

    #[test]
    fn campaign_status_unknown_code_reads_as_completed() {
        assert_eq!(
            CampaignStatus::from_i32(99),
            CampaignStatus::Completed,
            "unknown status must not be re-dispatchable"
        );
        assert_eq!(CampaignStatus::from_i32(-1), CampaignStatus::Completed);
    }

    #[test]
    fn job_kind_labels_are_distinct() {
        let kinds = [
            Job::VideoFetch {
                url: "https://example.com/v".into(),
                requester: 1,
                format_id: None,
                output_ext: None,
            }
            .kind(),
            Job::AudioFetch {
                video_id: "abc".into(),
                requester: 1,
            }
            .kind(),
            Job::BroadcastSend { campaign_id: 1 }.kind(),
            Job::BroadcastEdit {
                campaign_id: 1,
                new_text: "x".into(),
                new_media: None,
            }
            .kind(),
            Job::BroadcastDelete { campaign_id: 1 }.kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }

    #[test]
    fn artifact_ref_remote_is_preferred_marker() {
        assert!(ArtifactRef::Remote("BAACAgIAAxk".into()).is_remote());
        assert!(!ArtifactRef::Local(PathBuf::from("/scratch/a.mp4")).is_remote());
    }

    #[test]
    fn artifact_ref_serializes_with_kind_tag() {
        let json = serde_json::to_string(&ArtifactRef::Remote("f1".into())).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["kind"], "remote");
        assert_eq!(parsed["value"], "f1");

        let back: ArtifactRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ArtifactRef::Remote("f1".into()));
    }

    #[test]
    fn job_id_display_and_conversions() {
        let id = JobId::from(42_i64);
        assert_eq!(id.to_string(), "42");
        let raw: i64 = id.into();
        assert_eq!(raw, 42);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(JobOutcome::Succeeded.label(), "succeeded");
        assert_eq!(
            JobOutcome::Failed(crate::error::FetchErrorKind::Transient).label(),
            "failed"
        );
        assert_eq!(JobOutcome::SkippedDuplicate.label(), "skipped_duplicate");
    }

    #[test]
    fn media_content_type_labels_match_db_strings() {
        assert_eq!(MediaContent::Text.type_label(), "text");
        assert_eq!(
            MediaContent::Video(ArtifactRef::Remote("v".into())).type_label(),
            "video"
        );
        assert_eq!(
            MediaContent::Photo(ArtifactRef::Remote("p".into())).type_label(),
            "photo"
        );
        assert_eq!(
            MediaContent::Animation(ArtifactRef::Remote("a".into())).type_label(),
            "animation"
        );
    }
}
