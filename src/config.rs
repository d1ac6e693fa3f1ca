//! Configuration types for mediaq

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Worker pool and queue configuration
///
/// Groups settings for the job queue and the fixed worker pool that drains it.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers draining the job queue (default: 3)
    ///
    /// Fixed at startup. Workers never die on job failures; a failed job is
    /// reported to its requester and the worker moves on.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Interval between queue polls when the queue is empty (default: 100ms)
    #[serde(default = "default_poll_interval", with = "duration_millis")]
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Fingerprint lock configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lock time-to-live (default: 900 seconds)
    ///
    /// A crashed worker's lock expires after this long. This is also the
    /// documented maximum job duration: a job that outlives its lock loses
    /// exclusivity for its fingerprint.
    #[serde(default = "default_lock_ttl", with = "duration_secs")]
    pub ttl: Duration,

    /// Key prefix for lock entries in the shared store (default: "idempotency")
    #[serde(default = "default_lock_prefix")]
    pub key_prefix: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: default_lock_ttl(),
            key_prefix: default_lock_prefix(),
        }
    }
}

/// Result cache configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Artifact time-to-live (default: 3600 seconds)
    ///
    /// Entries older than this read as misses even if the backing store has
    /// not evicted them yet.
    #[serde(default = "default_cache_ttl", with = "duration_secs")]
    pub ttl: Duration,

    /// Key prefix for cache buckets in the shared store (default: "artifact")
    #[serde(default = "default_cache_prefix")]
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
            key_prefix: default_cache_prefix(),
        }
    }
}

/// Format selection constraints
///
/// Used as a nested sub-config within [`Config`] and passed to the pure
/// selection engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Target quality tiers in ascending order (default: 144..2160)
    #[serde(default = "default_tiers")]
    pub tiers: Vec<u32>,

    /// Maximum estimated size per selected format in bytes (default: 1 GiB)
    ///
    /// Candidates exceeding the ceiling are discarded, not downgraded.
    #[serde(default = "default_max_bytes_per_tier")]
    pub max_bytes_per_tier: u64,

    /// Video codec prefixes in descending preference order
    /// (default: avc1, h264, vp9, av01)
    #[serde(default = "default_codec_priority")]
    pub codec_priority: Vec<String>,

    /// Well-known universal format id used as a last resort when no tier
    /// produces a usable candidate (default: "18"). Only used if the
    /// extraction engine actually advertised it.
    #[serde(default = "default_universal_format")]
    pub universal_format_id: Option<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            max_bytes_per_tier: default_max_bytes_per_tier(),
            codec_priority: default_codec_priority(),
            universal_format_id: default_universal_format(),
        }
    }
}

/// Download executor configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Timeout for a single probe call (default: 30 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_secs")]
    pub probe_timeout: Duration,

    /// Timeout for a single fetch attempt (default: 600 seconds)
    ///
    /// Must stay below the lock TTL so a fetch cannot outlive its
    /// fingerprint lock; enforced by [`Config::validate`].
    #[serde(default = "default_fetch_timeout", with = "duration_secs")]
    pub fetch_timeout: Duration,

    /// Minimum interval between progress updates pushed through the sink
    /// (default: 2 seconds)
    #[serde(default = "default_progress_debounce", with = "duration_millis")]
    pub progress_debounce: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            probe_timeout: default_probe_timeout(),
            fetch_timeout: default_fetch_timeout(),
            progress_debounce: default_progress_debounce(),
        }
    }
}

/// Fan-out dispatcher configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Delay between consecutive send/edit actions (default: 50ms)
    #[serde(default = "default_send_delay", with = "duration_millis")]
    pub send_delay: Duration,

    /// Delay between consecutive delete actions (default: 30ms)
    #[serde(default = "default_delete_delay", with = "duration_millis")]
    pub delete_delay: Duration,

    /// Persist running counters every N processed recipients (default: 20)
    ///
    /// Bounds how much progress a mid-batch crash can lose.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u32,

    /// Timeout for a single delivery action (default: 10 seconds)
    #[serde(default = "default_delivery_timeout", with = "duration_secs")]
    pub delivery_timeout: Duration,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            send_delay: default_send_delay(),
            delete_delay: default_delete_delay(),
            checkpoint_every: default_checkpoint_every(),
            delivery_timeout: default_delivery_timeout(),
        }
    }
}

/// Storage locations and scratch cleanup
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path (default: "./mediaq.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Scratch directory for in-flight artifacts (default: "./scratch")
    ///
    /// Files here are removed by the periodic sweep based on age, never by
    /// the worker that wrote them.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Shared key-value store URL (default: None = store absent)
    ///
    /// The store is optional infrastructure: when absent or unreachable,
    /// locking fails open and the result cache degrades to a permanent miss.
    #[serde(default)]
    pub store_url: Option<String>,

    /// Scratch files older than this are swept (default: 1800 seconds)
    #[serde(default = "default_scratch_max_age", with = "duration_secs")]
    pub scratch_max_age: Duration,

    /// Interval between sweep passes (default: 300 seconds)
    #[serde(default = "default_sweep_interval", with = "duration_secs")]
    pub sweep_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            scratch_dir: default_scratch_dir(),
            store_url: None,
            scratch_max_age: default_scratch_max_age(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Retry configuration for transient external-call failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts after the initial try (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial retry delay (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_millis")]
    pub initial_delay: Duration,

    /// Maximum retry delay (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_delay: Duration,

    /// Backoff multiplier applied per attempt (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays to avoid thundering herd (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the orchestrator
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool and queue settings
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Fingerprint lock settings
    #[serde(default)]
    pub lock: LockConfig,

    /// Result cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Format selection constraints
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Download executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Fan-out dispatcher settings
    #[serde(default)]
    pub fanout: FanoutConfig,

    /// Storage locations and scratch cleanup
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retry behavior for transient external-call failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Validate cross-field constraints
    ///
    /// Returns a [`crate::error::Error::Config`] naming the offending key on
    /// the first violation found.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.workers.pool_size == 0 {
            return Err(crate::error::Error::Config {
                message: "worker pool size must be at least 1".into(),
                key: Some("workers.pool_size".into()),
            });
        }
        if self.lock.ttl.is_zero() {
            return Err(crate::error::Error::Config {
                message: "lock TTL must be non-zero".into(),
                key: Some("lock.ttl".into()),
            });
        }
        // A fetch must not outlive the fingerprint lock, or a duplicate can
        // start while the first fetch is still running.
        if self.executor.fetch_timeout >= self.lock.ttl {
            return Err(crate::error::Error::Config {
                message: format!(
                    "fetch timeout ({}s) must be below the lock TTL ({}s)",
                    self.executor.fetch_timeout.as_secs(),
                    self.lock.ttl.as_secs()
                ),
                key: Some("executor.fetch_timeout".into()),
            });
        }
        if self.selection.tiers.is_empty() {
            return Err(crate::error::Error::Config {
                message: "at least one quality tier is required".into(),
                key: Some("selection.tiers".into()),
            });
        }
        if self.selection.max_bytes_per_tier == 0 {
            return Err(crate::error::Error::Config {
                message: "per-tier size ceiling must be non-zero".into(),
                key: Some("selection.max_bytes_per_tier".into()),
            });
        }
        if self.fanout.checkpoint_every == 0 {
            return Err(crate::error::Error::Config {
                message: "checkpoint interval must be at least 1".into(),
                key: Some("fanout.checkpoint_every".into()),
            });
        }
        Ok(())
    }
}

// --- serde helpers for Duration fields ---

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// --- defaults ---

fn default_pool_size() -> usize {
    3
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_lock_ttl() -> Duration {
    Duration::from_secs(900)
}

fn default_lock_prefix() -> String {
    "idempotency".to_string()
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_cache_prefix() -> String {
    "artifact".to_string()
}

fn default_tiers() -> Vec<u32> {
    vec![144, 240, 360, 480, 720, 1080, 1440, 2160]
}

fn default_max_bytes_per_tier() -> u64 {
    1024 * 1024 * 1024
}

fn default_codec_priority() -> Vec<String> {
    vec![
        "avc1".to_string(),
        "h264".to_string(),
        "vp9".to_string(),
        "av01".to_string(),
    ]
}

fn default_universal_format() -> Option<String> {
    Some("18".to_string())
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_progress_debounce() -> Duration {
    Duration::from_secs(2)
}

fn default_send_delay() -> Duration {
    Duration::from_millis(50)
}

fn default_delete_delay() -> Duration {
    Duration::from_millis(30)
}

fn default_checkpoint_every() -> u32 {
    20
}

fn default_delivery_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./mediaq.db")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("./scratch")
}

fn default_scratch_max_age() -> Duration {
    Duration::from_secs(1800)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}
