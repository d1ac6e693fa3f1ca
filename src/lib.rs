//! # mediaq
//!
//! Backend library for media fetch and broadcast orchestration.
//!
//! ## Design Philosophy
//!
//! mediaq is designed to be:
//! - **Idempotent** - identical in-flight requests collapse into one job
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Degradable** - the shared store is optional; without it locking
//!   fails open and the result cache reads as a miss
//! - **Event-driven** - consumers subscribe to lifecycle events
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mediaq::{Config, Job, Orchestrator, progress::NullSink};
//! # use mediaq::extractor::MediaExtractor;
//! # use mediaq::transport::ChatTransport;
//!
//! # async fn example(
//! #     extractor: Arc<dyn MediaExtractor>,
//! #     transport: Arc<dyn ChatTransport>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let orchestrator = Orchestrator::new(config, extractor, transport).await?;
//! orchestrator.start().await?;
//!
//! // Subscribe to events
//! let mut events = orchestrator.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! orchestrator
//!     .submit(
//!         Job::VideoFetch {
//!             url: "https://example.com/watch?v=abc".to_string(),
//!             requester: 42,
//!             format_id: None,
//!             output_ext: None,
//!         },
//!         Arc::new(NullSink),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Content-addressed result cache
pub mod cache;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Download execution with fallback ladder
pub mod executor;
/// Extraction engine boundary
pub mod extractor;
/// Broadcast fan-out dispatcher
pub mod fanout;
/// Job fingerprinting for deduplication
pub mod fingerprint;
/// Fingerprint locking
pub mod lock;
/// Job orchestrator and worker pool
pub mod orchestrator;
/// Progress reporting with debounce
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Format selection engine
pub mod selection;
/// Shared key-value store boundary
pub mod store;
/// Scratch directory sweeping
pub mod sweep;
/// Chat transport boundary
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use cache::{CachedArtifact, ResultCache};
pub use config::{Config, FanoutConfig, LockConfig, SelectionConfig, StorageConfig};
pub use db::{Campaign, Database, DeliveryRecord, NewCampaign};
pub use error::{
    CampaignError, DatabaseError, Error, ExtractionError, FetchError, FetchErrorKind, Result,
};
pub use executor::{DownloadExecutor, FetchOutcome, FetchResult};
pub use fanout::{FanoutDispatcher, FanoutSummary};
pub use fingerprint::Fingerprint;
pub use lock::LockManager;
pub use orchestrator::Orchestrator;
pub use selection::{FormatCandidate, SelectedFormat, select};
pub use types::{
    ArtifactRef, CampaignStatus, Event, Job, JobId, JobOutcome, MediaContent, SubmitResult,
};

/// Helper function to run the orchestrator with graceful signal handling.
///
/// Waits for a termination signal and then calls the orchestrator's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use mediaq::{Config, Orchestrator, run_with_shutdown};
/// # use mediaq::extractor::MediaExtractor;
/// # use mediaq::transport::ChatTransport;
///
/// # async fn example(
/// #     extractor: Arc<dyn MediaExtractor>,
/// #     transport: Arc<dyn ChatTransport>,
/// # ) -> Result<(), Box<dyn std::error::Error>> {
/// let orchestrator = Orchestrator::new(Config::default(), extractor, transport).await?;
/// orchestrator.start().await?;
///
/// // Run with automatic signal handling
/// run_with_shutdown(orchestrator).await;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(orchestrator: std::sync::Arc<Orchestrator>) {
    wait_for_signal().await;
    orchestrator.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
