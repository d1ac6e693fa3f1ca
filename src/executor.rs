//! Download executor
//!
//! Drives one fetch job from probe to a deliverable artifact:
//! `Requested -> Probing -> Fetching -> (Succeeded | Failed)`. Inside
//! `Fetching` sits the fallback ladder: the requested format with full
//! credentials, then without credentials, then a generic best-effort fetch.
//! The ladder advances only on format-unavailable failures; resource-state
//! failures (gone, restricted, oversized) abort immediately because no rung
//! below can change what the resource is.
//!
//! On success the artifact is written to the result cache before completion
//! is reported. Partial files from failed attempts are left on scratch for
//! the periodic sweep; nothing is deleted inline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CachedArtifact, ResultCache};
use crate::config::{ExecutorConfig, RetryConfig, SelectionConfig};
use crate::error::{FetchError, FetchErrorKind};
use crate::extractor::{
    FetchRequest, FetchStrategy, FetchedMedia, MediaExtractor, MediaProbe, classify_error,
};
use crate::progress::{DebouncedSink, FetchPhase, FetchProgress, ProgressSink};
use crate::retry::run_with_retry;
use crate::selection::{SelectedFormat, select};
use crate::types::ArtifactRef;

/// Outcome of a fetch, distinguishing cache hits for observability
#[derive(Clone, Debug)]
pub enum FetchOutcome {
    /// Served from the result cache without touching the engine
    CacheHit(CachedArtifact),
    /// Freshly fetched from the engine
    Fetched(FetchResult),
}

impl FetchOutcome {
    /// The artifact regardless of where it came from
    pub fn artifact(&self) -> &ArtifactRef {
        match self {
            FetchOutcome::CacheHit(entry) => &entry.artifact,
            FetchOutcome::Fetched(result) => &result.artifact,
        }
    }

    /// Display title, when known
    pub fn title(&self) -> Option<&str> {
        match self {
            FetchOutcome::CacheHit(entry) => entry.title.as_deref(),
            FetchOutcome::Fetched(result) => result.title.as_deref(),
        }
    }
}

/// A freshly fetched artifact
#[derive(Clone, Debug)]
pub struct FetchResult {
    /// Local scratch path of the artifact
    pub artifact: ArtifactRef,
    /// Display title reported by the engine
    pub title: Option<String>,
}

/// Executes fetch jobs against the extraction engine
pub struct DownloadExecutor {
    extractor: Arc<dyn MediaExtractor>,
    cache: ResultCache,
    config: ExecutorConfig,
    selection: SelectionConfig,
    retry: RetryConfig,
    scratch_dir: PathBuf,
}

impl DownloadExecutor {
    /// Create an executor over an extraction engine and result cache
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        cache: ResultCache,
        config: ExecutorConfig,
        selection: SelectionConfig,
        retry: RetryConfig,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            extractor,
            cache,
            config,
            selection,
            retry,
            scratch_dir,
        }
    }

    /// Probe a target and rank its formats into a deliverable menu
    ///
    /// Walks the ladder for the probe itself: a probe that fails with
    /// credentials may still succeed anonymously. An empty menu surfaces as
    /// [`FetchErrorKind::NoFormats`].
    pub async fn probe_formats(
        &self,
        url: &str,
    ) -> Result<(MediaProbe, Vec<SelectedFormat>), FetchError> {
        let mut last_error = FetchError::transient("probe not attempted");
        for strategy in FetchStrategy::ladder() {
            let attempt = tokio::time::timeout(
                self.config.probe_timeout,
                self.extractor.probe(url, strategy),
            )
            .await;

            match attempt {
                Ok(Ok(probe)) => {
                    let menu = select(&probe.candidates, probe.duration_secs, &self.selection);
                    if menu.is_empty() {
                        return Err(FetchError::new(
                            FetchErrorKind::NoFormats,
                            format!("no deliverable formats for {url}"),
                        ));
                    }
                    return Ok((probe, menu));
                }
                Ok(Err(e)) => {
                    let kind = classify_error(&e.message);
                    tracing::debug!(
                        url = %url,
                        strategy = strategy.label(),
                        kind = kind.code(),
                        "Probe attempt failed"
                    );
                    last_error = FetchError::new(kind, e.message);
                    if !ladder_continues(kind) {
                        return Err(last_error);
                    }
                }
                Err(_) => {
                    last_error = FetchError::transient(format!(
                        "probe timed out after {}s",
                        self.config.probe_timeout.as_secs()
                    ));
                }
            }
        }
        Err(last_error)
    }

    /// Fetch a video, preferring the cache
    ///
    /// `cache_hash` is the content hash of the normalized target; None skips
    /// cache interaction entirely.
    pub async fn fetch_video(
        &self,
        url: &str,
        format_id: Option<&str>,
        output_ext: Option<&str>,
        cache_hash: Option<&str>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<FetchOutcome, FetchError> {
        if let Some(hash) = cache_hash
            && let Some(entry) = self.cache.get(hash).await
        {
            tracing::info!(hash = %hash, "Result cache hit, skipping fetch");
            return Ok(FetchOutcome::CacheHit(entry));
        }

        let sink: Arc<dyn ProgressSink> = Arc::new(DebouncedSink::new(
            sink,
            self.config.progress_debounce,
        ));
        sink.update(FetchProgress::phase(FetchPhase::Probing)).await;

        let media = self
            .run_ladder(url, format_id, output_ext, sink.clone())
            .await?;

        sink.update(FetchProgress::phase(FetchPhase::Done)).await;

        let artifact = ArtifactRef::Local(media.path.clone());
        if let Some(hash) = cache_hash {
            self.cache.put(hash, artifact.clone(), media.title.clone()).await;
        }

        Ok(FetchOutcome::Fetched(FetchResult {
            artifact,
            title: media.title,
        }))
    }

    /// Fetch the audio track of a platform video id, preferring the cache
    pub async fn fetch_audio(
        &self,
        video_id: &str,
        cache_hash: Option<&str>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<FetchOutcome, FetchError> {
        if let Some(hash) = cache_hash
            && let Some(entry) = self.cache.get(hash).await
        {
            tracing::info!(hash = %hash, "Result cache hit, skipping audio fetch");
            return Ok(FetchOutcome::CacheHit(entry));
        }

        let sink: Arc<dyn ProgressSink> = Arc::new(DebouncedSink::new(
            sink,
            self.config.progress_debounce,
        ));
        let progress = forward_to(sink.clone());

        let dest = self.scratch_dir.clone();
        let media = run_with_retry(&self.retry, || {
            let progress = progress.clone();
            let dest = dest.clone();
            async move {
                tokio::time::timeout(
                    self.config.fetch_timeout,
                    self.extractor.fetch_audio(video_id, &dest, progress),
                )
                .await
                .map_err(|_| {
                    FetchError::transient(format!(
                        "audio fetch timed out after {}s",
                        self.config.fetch_timeout.as_secs()
                    ))
                })?
                .map_err(|e| FetchError::new(classify_error(&e.message), e.message))
            }
        })
        .await?;

        sink.update(FetchProgress::phase(FetchPhase::Done)).await;

        let artifact = ArtifactRef::Local(media.path.clone());
        if let Some(hash) = cache_hash {
            self.cache.put(hash, artifact.clone(), media.title.clone()).await;
        }

        Ok(FetchOutcome::Fetched(FetchResult {
            artifact,
            title: media.title,
        }))
    }

    /// Walk the fallback ladder for one video fetch
    async fn run_ladder(
        &self,
        url: &str,
        format_id: Option<&str>,
        output_ext: Option<&str>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<FetchedMedia, FetchError> {
        let mut last_error = FetchError::transient("fetch not attempted");

        for strategy in FetchStrategy::ladder() {
            let request = FetchRequest {
                url: url.to_string(),
                // the bottom rung drops the pin and takes what it can get
                format_id: match strategy {
                    FetchStrategy::GenericBestEffort => None,
                    _ => format_id.map(str::to_string),
                },
                output_ext: output_ext.map(str::to_string),
                dest_dir: self.scratch_dir.clone(),
                strategy,
            };

            match self.attempt_fetch(&request, sink.clone()).await {
                Ok(media) => {
                    if strategy != FetchStrategy::PrimaryWithCredentials {
                        tracing::info!(
                            url = %url,
                            strategy = strategy.label(),
                            "Fetch succeeded on fallback strategy"
                        );
                    }
                    return Ok(media);
                }
                Err(e) => {
                    tracing::warn!(
                        url = %url,
                        strategy = strategy.label(),
                        kind = e.kind.code(),
                        "Fetch attempt failed"
                    );
                    let kind = e.kind;
                    last_error = e;
                    if !ladder_continues(kind) {
                        return Err(last_error);
                    }
                }
            }
        }

        Err(last_error)
    }

    /// One rung: fetch with per-call timeout and transient retry
    async fn attempt_fetch(
        &self,
        request: &FetchRequest,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<FetchedMedia, FetchError> {
        let progress = forward_to(sink);
        run_with_retry(&self.retry, || {
            let progress = progress.clone();
            async move {
                tokio::time::timeout(self.config.fetch_timeout, self.extractor.fetch(request, progress))
                    .await
                    .map_err(|_| {
                        FetchError::transient(format!(
                            "fetch timed out after {}s",
                            self.config.fetch_timeout.as_secs()
                        ))
                    })?
                    .map_err(|e| {
                        if let Some(partial) = &e.partial_path {
                            // left for the sweep, never removed here
                            tracing::debug!(path = %partial.display(), "Partial file left on scratch");
                        }
                        FetchError::new(classify_error(&e.message), e.message)
                    })
            }
        })
        .await
    }

    /// Timeout used for single fetch attempts
    pub fn fetch_timeout(&self) -> Duration {
        self.config.fetch_timeout
    }
}

/// Whether a failure of this kind is worth descending the ladder for
///
/// Resource-state failures abort: no rung below changes what the resource
/// is. Format misses and transient noise keep descending.
fn ladder_continues(kind: FetchErrorKind) -> bool {
    matches!(
        kind,
        FetchErrorKind::FormatUnavailable | FetchErrorKind::Transient
    )
}

/// Bridge the engine's synchronous progress callback onto the async sink
fn forward_to(sink: Arc<dyn ProgressSink>) -> crate::extractor::ProgressFn {
    Arc::new(move |update: FetchProgress| {
        let sink = sink.clone();
        tokio::spawn(async move {
            sink.update(update).await;
        });
    })
}
