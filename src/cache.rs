//! Content-addressed result cache
//!
//! Fetched artifacts are cached under their content hash so a repeat request
//! for the same target is served without re-downloading. Entries live in hash
//! buckets keyed by the first two hex chars of the content hash
//! (`artifact:ab`), with the full hash as the field; the bucket TTL is
//! refreshed on every write, so hot buckets stay warm as a unit.
//!
//! Like the lock manager, the cache treats the shared store as optional:
//! every failure path reads as a miss and writes are best-effort.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;
use crate::store::SharedStore;
use crate::types::ArtifactRef;

/// A cached fetch result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedArtifact {
    /// The artifact itself, preferably a durable remote reference
    pub artifact: ArtifactRef,
    /// Display title captured at fetch time
    pub title: Option<String>,
    /// Unix timestamp (seconds) of the write, for staleness checks
    pub stored_at: i64,
}

/// Result cache over the shared store
#[derive(Clone)]
pub struct ResultCache {
    store: Option<Arc<dyn SharedStore>>,
    prefix: String,
    ttl: Duration,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("store", &self.store.is_some())
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ResultCache {
    /// Create a result cache over an optional shared store
    pub fn new(store: Option<Arc<dyn SharedStore>>, config: &CacheConfig) -> Self {
        Self {
            store,
            prefix: config.key_prefix.clone(),
            ttl: config.ttl,
        }
    }

    /// Bucket key for a content hash: prefix + first two hex chars
    fn bucket(&self, hash: &str) -> String {
        let shard = hash.get(..2).unwrap_or(hash);
        format!("{}:{}", self.prefix, shard)
    }

    /// Look up a cached artifact by content hash
    ///
    /// Returns None on miss, staleness, store failure, or when a `Local`
    /// artifact's file no longer exists on disk (the sweep may have removed
    /// it before the store entry expired).
    pub async fn get(&self, hash: &str) -> Option<CachedArtifact> {
        let store = self.store.as_ref()?;
        let bucket = self.bucket(hash);
        let raw = match store.hash_get(&bucket, hash).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(bucket = %bucket, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CachedArtifact = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(bucket = %bucket, error = %e, "Discarding undecodable cache entry");
                return None;
            }
        };

        // Entry-level staleness: the bucket TTL is shared, so an old entry in
        // a recently refreshed bucket can outlive its own useful life.
        let age = Utc::now().timestamp().saturating_sub(entry.stored_at);
        if age < 0 || age as u64 > self.ttl.as_secs() {
            tracing::debug!(hash = %hash, age_secs = age, "Cache entry stale");
            return None;
        }

        if let ArtifactRef::Local(path) = &entry.artifact
            && !path.exists()
        {
            tracing::debug!(path = %path.display(), "Cached local artifact no longer on disk");
            return None;
        }

        Some(entry)
    }

    /// Store an artifact under its content hash
    ///
    /// Refreshes the TTL of the whole bucket. Failures are logged and
    /// swallowed; caching is never load-bearing.
    pub async fn put(&self, hash: &str, artifact: ArtifactRef, title: Option<String>) {
        let Some(store) = &self.store else {
            return;
        };
        let entry = CachedArtifact {
            artifact,
            title,
            stored_at: Utc::now().timestamp(),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode cache entry");
                return;
            }
        };
        let bucket = self.bucket(hash);
        if let Err(e) = store.hash_set(&bucket, hash, &raw).await {
            tracing::warn!(bucket = %bucket, error = %e, "Cache write failed");
            return;
        }
        if let Err(e) = store.expire(&bucket, self.ttl).await {
            tracing::warn!(bucket = %bucket, error = %e, "Cache TTL refresh failed");
        }
    }
}
