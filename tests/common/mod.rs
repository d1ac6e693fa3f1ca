//! Common test utilities for mediaq integration tests

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use mediaq::config::{Config, FanoutConfig, RetryConfig, WorkerConfig};
use mediaq::error::ExtractionError;
use mediaq::extractor::{
    FetchRequest, FetchStrategy, FetchedMedia, MediaExtractor, MediaProbe, ProgressFn,
};
use mediaq::selection::FormatCandidate;
use mediaq::store::MemoryStore;
use mediaq::transport::{ChatTransport, SentMessage, TransportError, TransportResult};
use mediaq::types::{ArtifactRef, Event, MediaContent};
use mediaq::Orchestrator;

/// Extraction engine stub: writes a real file per fetch and counts calls
pub struct StubExtractor {
    /// Simulated engine latency per fetch
    pub delay: Duration,
    /// Error text every call fails with, when set
    pub fail_with: Mutex<Option<String>>,
    /// Number of fetch/fetch_audio calls that reached the engine
    pub fetch_count: AtomicUsize,
}

impl StubExtractor {
    pub fn instant() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_with: Mutex::new(None),
            fetch_count: AtomicUsize::new(0),
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    async fn produce(&self, dir: &Path, name: &str) -> Result<FetchedMedia, ExtractionError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(ExtractionError::new(message));
        }
        let path = dir.join(format!("{name}.mp4"));
        tokio::fs::write(&path, b"media bytes")
            .await
            .map_err(|e| ExtractionError::new(e.to_string()))?;
        Ok(FetchedMedia {
            path,
            title: Some("Stubbed Title".into()),
        })
    }
}

#[async_trait]
impl MediaExtractor for StubExtractor {
    async fn probe(
        &self,
        _url: &str,
        _strategy: FetchStrategy,
    ) -> Result<MediaProbe, ExtractionError> {
        Ok(MediaProbe {
            title: Some("Stubbed Title".into()),
            uploader: None,
            duration_secs: Some(120.0),
            candidates: vec![FormatCandidate {
                format_id: "22".into(),
                height: Some(720),
                has_audio: true,
                vcodec: Some("avc1.64001f".into()),
                container: "mp4".into(),
                filesize: Some(10_000_000),
                tbr: Some(1500.0),
            }],
        })
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        _progress: ProgressFn,
    ) -> Result<FetchedMedia, ExtractionError> {
        let name = format!("video-{}", self.fetch_count.load(Ordering::SeqCst));
        self.produce(&request.dest_dir, &name).await
    }

    async fn fetch_audio(
        &self,
        video_id: &str,
        dest_dir: &Path,
        _progress: ProgressFn,
    ) -> Result<FetchedMedia, ExtractionError> {
        self.produce(dest_dir, &format!("audio-{video_id}")).await
    }
}

/// Transport stub recording every outward action
#[derive(Default)]
pub struct RecordingTransport {
    next_message_id: AtomicI64,
    /// Recipients whose sends fail as permanently unreachable
    pub unreachable: Mutex<HashSet<i64>>,
    /// (recipient, artifact) pairs delivered via send_artifact
    pub artifacts: Mutex<Vec<(i64, ArtifactRef)>>,
    /// (recipient, text) notifications
    pub notices: Mutex<Vec<(i64, String)>>,
    /// (recipient, text) broadcast sends
    pub sends: Mutex<Vec<(i64, String)>>,
    /// (recipient, message_id) deletes
    pub deletes: Mutex<Vec<(i64, i64)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_id(&self) -> i64 {
        self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(
        &self,
        recipient: i64,
        _content: &MediaContent,
        text: &str,
    ) -> TransportResult<SentMessage> {
        if self.unreachable.lock().unwrap().contains(&recipient) {
            return Err(TransportError::RecipientUnreachable {
                recipient,
                reason: "blocked".into(),
            });
        }
        self.sends.lock().unwrap().push((recipient, text.into()));
        Ok(SentMessage {
            message_id: self.next_id(),
            remote_ref: None,
        })
    }

    async fn edit(
        &self,
        _recipient: i64,
        _message_id: i64,
        _content: &MediaContent,
        _text: &str,
    ) -> TransportResult<()> {
        Ok(())
    }

    async fn delete(&self, recipient: i64, message_id: i64) -> TransportResult<()> {
        self.deletes.lock().unwrap().push((recipient, message_id));
        Ok(())
    }

    async fn send_artifact(
        &self,
        recipient: i64,
        artifact: &ArtifactRef,
        _caption: Option<&str>,
    ) -> TransportResult<SentMessage> {
        self.artifacts
            .lock()
            .unwrap()
            .push((recipient, artifact.clone()));
        let message_id = self.next_id();
        Ok(SentMessage {
            message_id,
            // platform hands back a durable handle for every upload
            remote_ref: Some(format!("remote-{message_id}")),
        })
    }

    async fn notify(&self, recipient: i64, text: &str) -> TransportResult<()> {
        self.notices.lock().unwrap().push((recipient, text.into()));
        Ok(())
    }
}

/// Config with tight timings suitable for tests, rooted in `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.database_path = dir.join("mediaq.db");
    config.storage.scratch_dir = dir.join("scratch");
    config.workers = WorkerConfig {
        pool_size: 3,
        poll_interval: Duration::from_millis(10),
    };
    config.fanout = FanoutConfig {
        send_delay: Duration::from_millis(1),
        delete_delay: Duration::from_millis(1),
        checkpoint_every: 2,
        delivery_timeout: Duration::from_secs(2),
    };
    config.retry = RetryConfig {
        max_attempts: 0,
        ..Default::default()
    };
    config
}

/// Build and start an orchestrator over an in-process store
pub async fn start_orchestrator(
    dir: &Path,
    extractor: Arc<dyn MediaExtractor>,
    transport: Arc<dyn ChatTransport>,
) -> Arc<Orchestrator> {
    let orchestrator = Orchestrator::with_store(
        test_config(dir),
        extractor,
        transport,
        Some(Arc::new(MemoryStore::new())),
    )
    .await
    .expect("orchestrator");
    orchestrator.start().await.expect("start");
    orchestrator
}

/// Wait until an event matching the predicate arrives, or panic on timeout
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<Event>,
    what: &str,
    mut predicate: impl FnMut(&Event) -> bool,
) -> Event {
    let deadline = Duration::from_secs(10);
    tokio::time::timeout(deadline, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}
