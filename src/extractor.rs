//! Extraction engine boundary
//!
//! The actual media extraction engine lives outside this crate; embedders
//! implement [`MediaExtractor`] over whatever engine they run. This module
//! owns the shape of that boundary: probe and fetch calls, the strategy
//! ladder the executor walks on failure, and the classifier that maps raw
//! engine error text onto the closed user-facing taxonomy.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ExtractionError, FetchErrorKind};
use crate::progress::FetchProgress;
use crate::selection::FormatCandidate;

/// Metadata and candidate formats for one target, from a probe call
#[derive(Clone, Debug, Default)]
pub struct MediaProbe {
    /// Display title
    pub title: Option<String>,
    /// Uploader/channel name
    pub uploader: Option<String>,
    /// Duration in seconds, used for bitrate-based size estimates
    pub duration_secs: Option<f64>,
    /// Raw formats advertised by the engine
    pub candidates: Vec<FormatCandidate>,
}

/// Extraction strategy, one rung of the executor's fallback ladder
///
/// Ordered from most to least capable. Later rungs trade fidelity for
/// reach: the last rung ignores the requested format entirely and takes
/// whatever the engine can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Primary engine client with stored credentials attached
    PrimaryWithCredentials,
    /// Primary engine client without credentials
    PrimaryAnonymous,
    /// Generic best-effort: no format pinning, engine picks what it can
    GenericBestEffort,
}

impl FetchStrategy {
    /// The full ladder in descent order
    pub fn ladder() -> [FetchStrategy; 3] {
        [
            FetchStrategy::PrimaryWithCredentials,
            FetchStrategy::PrimaryAnonymous,
            FetchStrategy::GenericBestEffort,
        ]
    }

    /// Label for logs
    pub fn label(&self) -> &'static str {
        match self {
            FetchStrategy::PrimaryWithCredentials => "primary_with_credentials",
            FetchStrategy::PrimaryAnonymous => "primary_anonymous",
            FetchStrategy::GenericBestEffort => "generic_best_effort",
        }
    }
}

/// One fetch call to the engine
#[derive(Clone, Debug)]
pub struct FetchRequest {
    /// Target URL
    pub url: String,
    /// Pinned format id; None (and always on the best-effort rung) lets the
    /// engine choose
    pub format_id: Option<String>,
    /// Requested container extension override
    pub output_ext: Option<String>,
    /// Directory the engine must write into
    pub dest_dir: PathBuf,
    /// Which rung of the ladder this call represents
    pub strategy: FetchStrategy,
}

/// A successfully fetched artifact
#[derive(Clone, Debug)]
pub struct FetchedMedia {
    /// Path of the written file inside the scratch directory
    pub path: PathBuf,
    /// Display title, when the engine reported one
    pub title: Option<String>,
}

/// Callback the engine invokes with raw progress; the executor passes in a
/// pre-debounced forwarder.
pub type ProgressFn = Arc<dyn Fn(FetchProgress) + Send + Sync>;

/// Boundary to the external extraction engine
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Probe a target for metadata and candidate formats
    async fn probe(
        &self,
        url: &str,
        strategy: FetchStrategy,
    ) -> std::result::Result<MediaProbe, ExtractionError>;

    /// Fetch a target into the request's destination directory
    ///
    /// Implementations should call `progress` as bytes arrive; throttling is
    /// handled by the caller. On failure the error may carry a partial
    /// output path, which is left for the cleanup sweep.
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: ProgressFn,
    ) -> std::result::Result<FetchedMedia, ExtractionError>;

    /// Fetch only the audio track of a platform video id
    async fn fetch_audio(
        &self,
        video_id: &str,
        dest_dir: &std::path::Path,
        progress: ProgressFn,
    ) -> std::result::Result<FetchedMedia, ExtractionError>;
}

/// Substring patterns checked in order; first hit wins. More specific
/// patterns come before generic ones ("sign in to confirm your age" must
/// classify as access, not unavailable).
const ERROR_PATTERNS: &[(&str, FetchErrorKind)] = &[
    ("requested format is not available", FetchErrorKind::FormatUnavailable),
    ("file is larger than max-filesize", FetchErrorKind::Oversized),
    ("sign in to confirm", FetchErrorKind::AccessRestricted),
    ("age-restricted", FetchErrorKind::AccessRestricted),
    ("age restricted", FetchErrorKind::AccessRestricted),
    ("login required", FetchErrorKind::AccessRestricted),
    ("join this channel", FetchErrorKind::AccessRestricted),
    ("members-only", FetchErrorKind::AccessRestricted),
    ("copyright", FetchErrorKind::RightsRestricted),
    ("blocked it on copyright grounds", FetchErrorKind::RightsRestricted),
    ("not available in your country", FetchErrorKind::RegionRestricted),
    ("not made this video available in your country", FetchErrorKind::RegionRestricted),
    ("geo restricted", FetchErrorKind::RegionRestricted),
    ("video unavailable", FetchErrorKind::Unavailable),
    ("this video is private", FetchErrorKind::Unavailable),
    ("private video", FetchErrorKind::Unavailable),
    ("has been removed", FetchErrorKind::Unavailable),
    ("account associated with this video has been terminated", FetchErrorKind::Unavailable),
    ("no video formats found", FetchErrorKind::NoFormats),
    ("no downloadable formats", FetchErrorKind::NoFormats),
];

/// Map raw engine error text onto the user-facing failure taxonomy
///
/// Matching is case-insensitive substring lookup against a fixed pattern
/// table. Anything unrecognized classifies as transient, so the requester
/// is invited to retry rather than shown raw engine output.
pub fn classify_error(message: &str) -> FetchErrorKind {
    let lowered = message.to_lowercase();
    for (pattern, kind) in ERROR_PATTERNS {
        if lowered.contains(pattern) {
            return *kind;
        }
    }
    FetchErrorKind::Transient
}
