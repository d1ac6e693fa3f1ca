//! Worker-side job execution
//!
//! A worker owns a job from lock acquisition to terminal notification. The
//! submission-time duplicate check is advisory; the acquire here is the
//! authoritative one, so a race between two submissions of the same work is
//! settled at this point. Workers never die on job failures: every failure
//! is classified, reported to the requester, and the worker moves on.

use crate::error::FetchErrorKind;
use crate::executor::FetchOutcome;
use crate::fingerprint::Fingerprint;
use crate::types::{ArtifactRef, Event, Job, JobId, JobOutcome};

use super::{Orchestrator, QueuedJob};

impl Orchestrator {
    /// Execute one job to its terminal state
    pub(crate) async fn process(&self, queued: QueuedJob) {
        let QueuedJob { id, job, sink } = queued;
        let _ = self.event_tx.send(Event::JobStarted { id });

        let fingerprint = Fingerprint::for_job(&job);
        if !self.locks.acquire(&fingerprint).await {
            tracing::info!(id = %id, fingerprint = %fingerprint, "Lost lock race, skipping job");
            if let Some(requester) = requester_of(&job) {
                self.notify(requester, "An identical request is already being processed.")
                    .await;
            }
            let _ = self.event_tx.send(Event::JobFinished {
                id,
                outcome: JobOutcome::SkippedDuplicate.label().to_string(),
            });
            return;
        }

        let outcome = self.dispatch(id, &job, sink).await;

        self.locks.release(&fingerprint).await;
        tracing::info!(id = %id, outcome = outcome.label(), "Job finished");
        let _ = self.event_tx.send(Event::JobFinished {
            id,
            outcome: outcome.label().to_string(),
        });
    }

    /// Route a job to its executor and turn the result into an outcome
    async fn dispatch(
        &self,
        id: JobId,
        job: &Job,
        sink: std::sync::Arc<dyn crate::progress::ProgressSink>,
    ) -> JobOutcome {
        match job {
            Job::VideoFetch {
                url,
                requester,
                format_id,
                output_ext,
            } => {
                let hash = Fingerprint::cache_hash(job);
                let result = self
                    .executor
                    .fetch_video(
                        url,
                        format_id.as_deref(),
                        output_ext.as_deref(),
                        hash.as_deref(),
                        sink,
                    )
                    .await;
                self.conclude_fetch(id, *requester, hash.as_deref(), result)
                    .await
            }

            Job::AudioFetch {
                video_id,
                requester,
            } => {
                let hash = Fingerprint::cache_hash(job);
                let result = self
                    .executor
                    .fetch_audio(video_id, hash.as_deref(), sink)
                    .await;
                self.conclude_fetch(id, *requester, hash.as_deref(), result)
                    .await
            }

            Job::BroadcastSend { campaign_id } => {
                match self.fanout.run_send(*campaign_id).await {
                    Ok(summary) => {
                        tracing::info!(
                            campaign_id,
                            sent = summary.sent,
                            failed = summary.failed,
                            "Broadcast send finished"
                        );
                        JobOutcome::Succeeded
                    }
                    Err(e) => {
                        tracing::error!(campaign_id, error = %e, "Broadcast send failed");
                        JobOutcome::Failed(FetchErrorKind::Transient)
                    }
                }
            }

            Job::BroadcastEdit {
                campaign_id,
                new_text,
                new_media,
            } => {
                match self
                    .fanout
                    .run_edit(*campaign_id, new_text, new_media.as_ref())
                    .await
                {
                    Ok(_) => JobOutcome::Succeeded,
                    Err(e) => {
                        tracing::error!(campaign_id, error = %e, "Broadcast edit failed");
                        JobOutcome::Failed(FetchErrorKind::Transient)
                    }
                }
            }

            Job::BroadcastDelete { campaign_id } => {
                match self.fanout.run_delete_all(*campaign_id).await {
                    Ok(_) => JobOutcome::Succeeded,
                    Err(e) => {
                        tracing::error!(campaign_id, error = %e, "Broadcast delete failed");
                        JobOutcome::Failed(FetchErrorKind::Transient)
                    }
                }
            }
        }
    }

    /// Deliver a fetch result to its requester, or explain the failure
    ///
    /// Exactly one terminal notification reaches the requester: the artifact
    /// on success, a classified explanation on failure. When the platform
    /// returns a durable file handle for the upload, the cache entry is
    /// upgraded from the scratch path to that handle, so repeat requests
    /// outlive the sweep.
    async fn conclude_fetch(
        &self,
        id: JobId,
        requester: i64,
        cache_hash: Option<&str>,
        result: Result<FetchOutcome, crate::error::FetchError>,
    ) -> JobOutcome {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(id = %id, kind = e.kind.code(), detail = %e.detail, "Fetch failed");
                self.notify(requester, &e.kind.to_string()).await;
                return JobOutcome::Failed(e.kind);
            }
        };

        if matches!(outcome, FetchOutcome::CacheHit(_)) {
            let _ = self.event_tx.send(Event::CacheHit { id });
        }

        let delivery = self
            .transport
            .send_artifact(requester, outcome.artifact(), outcome.title())
            .await;
        match delivery {
            Ok(sent) => {
                if let (Some(hash), Some(remote)) = (cache_hash, sent.remote_ref)
                    && !outcome.artifact().is_remote()
                {
                    tracing::debug!(id = %id, "Upgrading cache entry to durable remote handle");
                    self.cache
                        .put(
                            hash,
                            ArtifactRef::Remote(remote),
                            outcome.title().map(str::to_string),
                        )
                        .await;
                }
                JobOutcome::Succeeded
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Artifact delivery failed");
                self.notify(requester, "Your file is ready but could not be delivered.")
                    .await;
                JobOutcome::Failed(FetchErrorKind::Transient)
            }
        }
    }

    /// Best-effort requester notification; failures are logged only
    async fn notify(&self, requester: i64, text: &str) {
        if let Err(e) = self.transport.notify(requester, text).await {
            tracing::warn!(requester, error = %e, "Requester notification failed");
        }
    }
}

/// The requester to notify for per-user jobs; broadcast jobs have none
fn requester_of(job: &Job) -> Option<i64> {
    match job {
        Job::VideoFetch { requester, .. } | Job::AudioFetch { requester, .. } => Some(*requester),
        Job::BroadcastSend { .. } | Job::BroadcastEdit { .. } | Job::BroadcastDelete { .. } => None,
    }
}
