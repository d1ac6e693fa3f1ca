//! Job orchestrator
//!
//! Owns the in-process FIFO queue, the fixed worker pool draining it, and
//! the shared services workers use (database, locks, executor, fan-out,
//! transport). Submission is non-blocking: a job is fingerprinted, checked
//! against in-flight locks, and queued; the pool picks it up on the next
//! poll. Lifecycle events are published on a broadcast channel for
//! embedders that want to observe the pipeline.

mod worker;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use tokio::sync::{Mutex, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

use crate::cache::ResultCache;
use crate::config::Config;
use crate::db::{Database, NewCampaign};
use crate::error::{Error, Result};
use crate::executor::DownloadExecutor;
use crate::extractor::MediaExtractor;
use crate::fanout::FanoutDispatcher;
use crate::fingerprint::Fingerprint;
use crate::lock::LockManager;
use crate::progress::ProgressSink;
use crate::store::{RedisStore, SharedStore};
use crate::sweep::spawn_sweeper;
use crate::transport::ChatTransport;
use crate::types::{Event, Job, JobId, SubmitResult};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A queued job waiting for a worker
struct QueuedJob {
    id: JobId,
    job: Job,
    sink: Arc<dyn ProgressSink>,
}

/// The job orchestrator
///
/// Construct with [`Orchestrator::new`], then call [`Orchestrator::start`]
/// once to spawn the queue processor and background tasks. All methods take
/// `&self`; the orchestrator is shared behind an [`Arc`].
pub struct Orchestrator {
    config: Config,
    db: Arc<Database>,
    locks: LockManager,
    cache: ResultCache,
    executor: DownloadExecutor,
    fanout: FanoutDispatcher,
    transport: Arc<dyn ChatTransport>,
    queue: Mutex<VecDeque<QueuedJob>>,
    pool: Arc<Semaphore>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
    next_job_id: AtomicI64,
    accepting: AtomicBool,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Orchestrator {
    /// Create an orchestrator from configuration and the two external
    /// boundaries: the extraction engine and the chat transport
    ///
    /// Opens the database and connects to the shared store if one is
    /// configured. An unreachable store is downgraded to absence: locks
    /// fail open and the result cache reads as a permanent miss.
    pub async fn new(
        config: Config,
        extractor: Arc<dyn MediaExtractor>,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Arc<Self>> {
        let store = connect_store(config.storage.store_url.as_deref()).await;
        Self::with_store(config, extractor, transport, store).await
    }

    /// Create an orchestrator over an explicit shared store
    ///
    /// [`Orchestrator::new`] resolves the store from configuration; this
    /// constructor accepts one directly (an in-process [`crate::store::MemoryStore`],
    /// or None for no store at all).
    pub async fn with_store(
        config: Config,
        extractor: Arc<dyn MediaExtractor>,
        transport: Arc<dyn ChatTransport>,
        store: Option<Arc<dyn SharedStore>>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.storage.database_path).await?);
        tokio::fs::create_dir_all(&config.storage.scratch_dir).await?;
        let locks = LockManager::new(store.clone(), &config.lock);
        let cache = ResultCache::new(store, &config.cache);
        let executor = DownloadExecutor::new(
            extractor,
            cache.clone(),
            config.executor.clone(),
            config.selection.clone(),
            config.retry.clone(),
            config.storage.scratch_dir.clone(),
        );

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let fanout = FanoutDispatcher::new(
            db.clone(),
            transport.clone(),
            config.fanout.clone(),
            event_tx.clone(),
        );

        let pool = Arc::new(Semaphore::new(config.workers.pool_size));

        Ok(Arc::new(Self {
            config,
            db,
            locks,
            cache,
            executor,
            fanout,
            transport,
            queue: Mutex::new(VecDeque::new()),
            pool,
            event_tx,
            cancel_token: CancellationToken::new(),
            next_job_id: AtomicI64::new(1),
            accepting: AtomicBool::new(true),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Spawn the queue processor and background tasks
    ///
    /// Also re-enqueues any campaign left mid-dispatch by a previous
    /// process; the delivery ledger makes the resumed send skip recipients
    /// who were already served.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        tasks.push(spawn_processor(self.clone()));
        tasks.push(spawn_sweeper(
            self.config.storage.clone(),
            self.cancel_token.clone(),
        ));
        drop(tasks);

        for campaign in self.db.list_interrupted_campaigns().await? {
            tracing::info!(campaign_id = campaign.id, "Resuming interrupted campaign");
            let resumed = self
                .submit(
                    Job::BroadcastSend {
                        campaign_id: campaign.id,
                    },
                    Arc::new(crate::progress::NullSink),
                )
                .await?;
            if resumed == SubmitResult::RejectedDuplicate {
                tracing::warn!(
                    campaign_id = campaign.id,
                    "Campaign already in flight elsewhere, not resuming here"
                );
            }
        }

        Ok(())
    }

    /// Submit a job for execution
    ///
    /// Returns [`SubmitResult::RejectedDuplicate`] without queueing when an
    /// identical job's fingerprint lock is already held. This check is
    /// advisory; the worker re-checks by actually acquiring the lock.
    pub async fn submit(
        &self,
        job: Job,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<SubmitResult> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        validate_job(&job)?;

        let fingerprint = Fingerprint::for_job(&job);
        if self.locks.is_held(&fingerprint).await {
            tracing::info!(
                fingerprint = %fingerprint,
                kind = job.kind(),
                "Rejecting duplicate submission"
            );
            let _ = self.event_tx.send(Event::JobRejectedDuplicate {
                kind: job.kind().to_string(),
                fingerprint: fingerprint.to_string(),
            });
            return Ok(SubmitResult::RejectedDuplicate);
        }

        let id = JobId::new(self.next_job_id.fetch_add(1, Ordering::SeqCst));
        let kind = job.kind().to_string();
        self.queue.lock().await.push_back(QueuedJob { id, job, sink });
        let _ = self.event_tx.send(Event::JobQueued { id, kind });
        tracing::debug!(id = %id, "Job queued");

        Ok(SubmitResult::Accepted(id))
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Number of jobs waiting for a worker
    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// The campaign database, for campaign and recipient management
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Persist a new campaign, returning its id
    ///
    /// The campaign stays `Pending` until a [`Job::BroadcastSend`] for it is
    /// submitted and picked up.
    pub async fn create_campaign(&self, campaign: &NewCampaign) -> Result<i64> {
        self.db.insert_campaign(campaign).await
    }

    /// Register a broadcast recipient, idempotently
    pub async fn register_recipient(&self, recipient: i64) -> Result<()> {
        self.db.register_recipient(recipient).await
    }

    /// Graceful shutdown
    ///
    /// Stops accepting submissions, waits for in-flight workers to finish
    /// their current job, then stops background tasks and closes the
    /// database. Queued-but-unstarted jobs are dropped.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let _ = self.event_tx.send(Event::Shutdown);
        self.cancel_token.cancel();

        // draining the full pool means every worker has returned its permit
        let _ = self
            .pool
            .acquire_many(self.config.workers.pool_size as u32)
            .await;

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        drop(tasks);

        self.db.close().await;
        tracing::info!("Orchestrator shut down");
    }
}

/// Connect the shared store, downgrading failure to absence
async fn connect_store(url: Option<&str>) -> Option<Arc<dyn SharedStore>> {
    let url = url?;
    match RedisStore::connect(url).await {
        Ok(store) => Some(Arc::new(store) as Arc<dyn SharedStore>),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Shared store unreachable; locks fail open and cache is disabled"
            );
            None
        }
    }
}

/// Reject structurally invalid jobs before they are fingerprinted
fn validate_job(job: &Job) -> Result<()> {
    match job {
        Job::VideoFetch { url, .. } => {
            let parsed = url::Url::parse(url)
                .map_err(|e| Error::InvalidTarget(format!("{url}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::InvalidTarget(format!(
                    "{url}: unsupported scheme {}",
                    parsed.scheme()
                )));
            }
            Ok(())
        }
        Job::AudioFetch { video_id, .. } => {
            if video_id.trim().is_empty() {
                return Err(Error::InvalidTarget("empty video id".into()));
            }
            Ok(())
        }
        Job::BroadcastSend { .. } | Job::BroadcastEdit { .. } | Job::BroadcastDelete { .. } => {
            Ok(())
        }
    }
}

/// Spawn the queue processor task
///
/// Polls the queue on a fixed interval and hands each job to a worker slot.
/// When the pool is saturated the processor waits; the queue keeps
/// absorbing submissions meanwhile.
fn spawn_processor(orchestrator: Arc<Orchestrator>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(orchestrator.config.workers.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    drain_queue(&orchestrator).await;
                }
                _ = orchestrator.cancel_token.cancelled() => {
                    break;
                }
            }
        }
    })
}

/// Hand every currently queued job to a worker, in FIFO order
async fn drain_queue(orchestrator: &Arc<Orchestrator>) {
    loop {
        let queued = orchestrator.queue.lock().await.pop_front();
        let Some(queued) = queued else {
            break;
        };

        let permit = tokio::select! {
            permit = orchestrator.pool.clone().acquire_owned() => {
                match permit {
                    Ok(permit) => permit,
                    // pool closed, shutdown is underway
                    Err(_) => break,
                }
            }
            _ = orchestrator.cancel_token.cancelled() => {
                break;
            }
        };

        let this = orchestrator.clone();
        tokio::spawn(async move {
            this.process(queued).await;
            drop(permit);
        });
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_jobs_require_http_urls() {
        let bad = Job::VideoFetch {
            url: "ftp://example.com/v".into(),
            requester: 1,
            format_id: None,
            output_ext: None,
        };
        assert!(validate_job(&bad).is_err());

        let good = Job::VideoFetch {
            url: "https://example.com/v".into(),
            requester: 1,
            format_id: None,
            output_ext: None,
        };
        assert!(validate_job(&good).is_ok());
    }

    #[test]
    fn unparseable_urls_are_rejected() {
        let job = Job::VideoFetch {
            url: "not a url".into(),
            requester: 1,
            format_id: None,
            output_ext: None,
        };
        let err = validate_job(&job).unwrap_err();
        assert!(err.to_string().contains("invalid target"), "got: {err}");
    }

    #[test]
    fn empty_audio_id_is_rejected() {
        let job = Job::AudioFetch {
            video_id: "  ".into(),
            requester: 1,
        };
        assert!(validate_job(&job).is_err());
    }

    #[test]
    fn broadcast_jobs_need_no_validation() {
        assert!(validate_job(&Job::BroadcastSend { campaign_id: 1 }).is_ok());
        assert!(validate_job(&Job::BroadcastDelete { campaign_id: 1 }).is_ok());
    }
}
