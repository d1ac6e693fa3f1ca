//! Error types for mediaq
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Fetch, Database, Config, etc.)
//! - The closed user-facing fetch failure taxonomy used by the executor
//! - Context information (job id, campaign id, file path, etc.)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mediaq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mediaq
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers.pool_size")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Media fetch failed with a classified, user-presentable cause
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Campaign not found or in a state that forbids the requested operation
    #[error("campaign error: {0}")]
    Campaign(#[from] CampaignError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid target URL or resource identity
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Campaign-related errors
#[derive(Debug, Error)]
pub enum CampaignError {
    /// Campaign not found in the database
    #[error("campaign {id} not found")]
    NotFound {
        /// The campaign ID that was not found
        id: i64,
    },

    /// Cannot perform operation in current campaign status
    #[error("cannot {operation} campaign {id} in status {status}")]
    InvalidStatus {
        /// The campaign ID that is in an invalid status for the operation
        id: i64,
        /// The operation that was attempted (e.g., "send", "edit")
        operation: String,
        /// The status that prevents the operation (e.g., "processing")
        status: String,
    },
}

/// A classified media fetch failure
///
/// Raw extraction-engine errors are mapped onto this closed set of categories
/// before they reach the requester, so a user is never shown a raw stack
/// trace. Unclassifiable errors fall back to [`FetchErrorKind::Transient`].
#[derive(Debug, Error)]
#[error("{kind}: {detail}")]
pub struct FetchError {
    /// The user-facing failure category
    pub kind: FetchErrorKind,
    /// Raw detail retained for logging (never shown verbatim to users)
    pub detail: String,
}

impl FetchError {
    /// Create a fetch error from a category and raw detail text
    pub fn new(kind: FetchErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Shorthand for a generic transient failure
    pub fn transient(detail: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transient, detail)
    }
}

/// The closed set of user-facing fetch failure categories
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// The target offers no downloadable formats at all
    NoFormats,
    /// The artifact exceeds the configured maximum size
    Oversized,
    /// The resource is gone, private, or never existed
    Unavailable,
    /// The resource requires sign-in or age verification
    AccessRestricted,
    /// The resource is blocked for rights/copyright reasons
    RightsRestricted,
    /// The resource is not available in the serving region
    RegionRestricted,
    /// The requested format is not available from the engine
    ///
    /// This category is internal: it drives the executor's fallback ladder
    /// and is only surfaced if every rung of the ladder fails with it.
    FormatUnavailable,
    /// A generic transient failure (timeout, network, unclassified)
    Transient,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            FetchErrorKind::NoFormats => "no downloadable formats",
            FetchErrorKind::Oversized => "file is too large to deliver",
            FetchErrorKind::Unavailable => "resource is unavailable or private",
            FetchErrorKind::AccessRestricted => "resource requires sign-in or age verification",
            FetchErrorKind::RightsRestricted => "resource is blocked for rights reasons",
            FetchErrorKind::RegionRestricted => "resource is not available in this region",
            FetchErrorKind::FormatUnavailable => "requested format is not available",
            FetchErrorKind::Transient => "temporary failure, please try again later",
        };
        write!(f, "{text}")
    }
}

impl FetchErrorKind {
    /// Machine-readable code for logs and structured notifications
    pub fn code(&self) -> &'static str {
        match self {
            FetchErrorKind::NoFormats => "no_formats",
            FetchErrorKind::Oversized => "oversized",
            FetchErrorKind::Unavailable => "unavailable",
            FetchErrorKind::AccessRestricted => "access_restricted",
            FetchErrorKind::RightsRestricted => "rights_restricted",
            FetchErrorKind::RegionRestricted => "region_restricted",
            FetchErrorKind::FormatUnavailable => "format_unavailable",
            FetchErrorKind::Transient => "transient",
        }
    }
}

/// Raw error reported by the extraction engine boundary
///
/// The engine hands back free-form error text (plus an optional output path
/// for partially written files); [`crate::extractor::classify_error`] maps the
/// text onto [`FetchErrorKind`].
#[derive(Debug, Error)]
#[error("extraction failed: {message}")]
pub struct ExtractionError {
    /// Raw error text from the engine
    pub message: String,
    /// Partial output file, if the engine got far enough to create one.
    /// Left on disk for the cleanup sweep, never deleted inline.
    pub partial_path: Option<PathBuf>,
}

impl ExtractionError {
    /// Create an extraction error from raw engine output
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            partial_path: None,
        }
    }
}
