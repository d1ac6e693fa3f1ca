//! Progress reporting for in-flight fetches
//!
//! The requester supplies a [`ProgressSink`] at submission time; the executor
//! wraps it in a [`DebouncedSink`] so a chatty extraction engine cannot flood
//! the transport. Debouncing lives on this side of the boundary: sinks
//! receive pre-throttled updates and never need their own rate limiting.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Phase of a fetch as reported to the requester
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchPhase {
    /// Probing the target for metadata and formats
    Probing,
    /// Bytes are being transferred
    Downloading,
    /// Transfer finished, post-processing (merge, remux) in progress
    Processing,
    /// Artifact ready for delivery
    Done,
}

/// A single progress update
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FetchProgress {
    /// Current phase
    pub phase: FetchPhase,
    /// Bytes transferred so far, when known
    pub bytes_done: Option<u64>,
    /// Total expected bytes, when known
    pub bytes_total: Option<u64>,
}

impl FetchProgress {
    /// A phase-only update with no byte counts
    pub fn phase(phase: FetchPhase) -> Self {
        Self {
            phase,
            bytes_done: None,
            bytes_total: None,
        }
    }

    /// Completion percentage when both byte counts are known
    pub fn percent(&self) -> Option<f64> {
        match (self.bytes_done, self.bytes_total) {
            (Some(done), Some(total)) if total > 0 => Some(done as f64 * 100.0 / total as f64),
            _ => None,
        }
    }
}

/// Receiver for progress updates, supplied by the requester
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Deliver one (already debounced) update. Failures inside the sink are
    /// its own concern; the executor never reacts to them.
    async fn update(&self, progress: FetchProgress);
}

/// A sink that drops everything, for fire-and-forget submissions
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl ProgressSink for NullSink {
    async fn update(&self, _progress: FetchProgress) {}
}

/// Rate-limiting wrapper around a [`ProgressSink`]
///
/// Forwards at most one update per debounce interval. Phase transitions
/// always pass through regardless of timing, so a requester never misses
/// the switch from downloading to processing or done.
pub struct DebouncedSink {
    inner: Arc<dyn ProgressSink>,
    interval: Duration,
    state: Mutex<DebounceState>,
}

struct DebounceState {
    last_emit: Option<Instant>,
    last_phase: Option<FetchPhase>,
}

impl DebouncedSink {
    /// Wrap a sink with a minimum interval between forwarded updates
    pub fn new(inner: Arc<dyn ProgressSink>, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            state: Mutex::new(DebounceState {
                last_emit: None,
                last_phase: None,
            }),
        }
    }
}

#[async_trait]
impl ProgressSink for DebouncedSink {
    async fn update(&self, progress: FetchProgress) {
        let forward = {
            let mut state = self.state.lock().await;
            let phase_changed = state.last_phase != Some(progress.phase);
            let interval_elapsed = state
                .last_emit
                .map(|t| t.elapsed() >= self.interval)
                .unwrap_or(true);
            if phase_changed || interval_elapsed {
                state.last_emit = Some(Instant::now());
                state.last_phase = Some(progress.phase);
                true
            } else {
                false
            }
        };
        if forward {
            self.inner.update(progress).await;
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        count: AtomicUsize,
    }

    #[async_trait]
    impl ProgressSink for CountingSink {
        async fn update(&self, _progress: FetchProgress) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn downloading(done: u64) -> FetchProgress {
        FetchProgress {
            phase: FetchPhase::Downloading,
            bytes_done: Some(done),
            bytes_total: Some(100),
        }
    }

    #[tokio::test]
    async fn rapid_updates_within_interval_are_dropped() {
        let counter = Arc::new(CountingSink::default());
        let sink = DebouncedSink::new(counter.clone(), Duration::from_secs(60));
        for i in 0..10 {
            sink.update(downloading(i)).await;
        }
        assert_eq!(
            counter.count.load(Ordering::SeqCst),
            1,
            "only the first update inside the window is forwarded"
        );
    }

    #[tokio::test]
    async fn updates_after_interval_pass_through() {
        let counter = Arc::new(CountingSink::default());
        let sink = DebouncedSink::new(counter.clone(), Duration::from_millis(10));
        sink.update(downloading(1)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        sink.update(downloading(2)).await;
        assert_eq!(counter.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn phase_transitions_bypass_the_debounce() {
        let counter = Arc::new(CountingSink::default());
        let sink = DebouncedSink::new(counter.clone(), Duration::from_secs(60));
        sink.update(downloading(1)).await;
        sink.update(downloading(2)).await; // dropped
        sink.update(FetchProgress::phase(FetchPhase::Processing)).await;
        sink.update(FetchProgress::phase(FetchPhase::Done)).await;
        assert_eq!(
            counter.count.load(Ordering::SeqCst),
            3,
            "phase changes must always reach the requester"
        );
    }

    #[test]
    fn percent_requires_both_counts() {
        assert_eq!(downloading(25).percent(), Some(25.0));
        assert_eq!(FetchProgress::phase(FetchPhase::Downloading).percent(), None);
        let zero_total = FetchProgress {
            phase: FetchPhase::Downloading,
            bytes_done: Some(10),
            bytes_total: Some(0),
        };
        assert_eq!(zero_total.percent(), None);
    }

    #[tokio::test]
    async fn null_sink_accepts_everything() {
        let sink = NullSink;
        sink.update(downloading(1)).await;
        sink.update(FetchProgress::phase(FetchPhase::Done)).await;
    }
}
