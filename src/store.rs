//! Shared key-value store boundary
//!
//! Both the fingerprint lock manager and the result cache sit on top of this
//! trait. The backing store is *optional infrastructure*: every consumer must
//! tolerate its absence or failure (locks fail open, cache reads degrade to
//! misses), so [`StoreError`] never escapes those modules.
//!
//! Two implementations ship with the crate:
//! - [`RedisStore`] — the production backend, safe for concurrent access from
//!   multiple workers and multiple process instances
//! - [`MemoryStore`] — a single-process fallback for embedders that run
//!   without shared infrastructure, and the backend used by the test suite

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error talking to the shared store
///
/// Consumers log this and degrade; it is never surfaced to requesters.
#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

/// Result alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Minimal key-value surface required by the lock manager and result cache
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Atomically set `key` to `value` with a TTL iff the key is absent.
    /// Returns true when the key was set by this call.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Read a plain key
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Delete a plain key. Deleting an absent key is a no-op.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Read one field of a hash bucket
    async fn hash_get(&self, bucket: &str, field: &str) -> StoreResult<Option<String>>;

    /// Write one field of a hash bucket
    async fn hash_set(&self, bucket: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Refresh the TTL of a whole key (plain or bucket)
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()>;
}

/// Redis-backed shared store
///
/// Uses a [`ConnectionManager`] so a dropped connection is re-established
/// transparently; individual command failures still surface as [`StoreError`]
/// and are absorbed by the caller.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisStore {
    /// Connect to a redis instance
    ///
    /// Fails fast when the URL is invalid or the server is unreachable;
    /// callers that treat the store as optional should downgrade the error
    /// to a warning and run without one.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError(format!("invalid store URL: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError(format!("failed to connect: {e}")))?;
        tracing::info!("Connected to shared key-value store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        // SET key value NX EX ttl — returns OK when set, nil when the key existed
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError(format!("SET NX failed: {e}")))?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| StoreError(format!("GET failed: {e}")))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| StoreError(format!("DEL failed: {e}")))
    }

    async fn hash_get(&self, bucket: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.hget(bucket, field)
            .await
            .map_err(|e| StoreError(format!("HGET failed: {e}")))
    }

    async fn hash_set(&self, bucket: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(bucket, field, value)
            .await
            .map_err(|e| StoreError(format!("HSET failed: {e}")))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| StoreError(format!("EXPIRE failed: {e}")))
    }
}

/// In-process shared store for single-instance deployments and tests
///
/// Implements the same TTL semantics as the redis backend (lazy expiry on
/// read). Not distributed-safe; use [`RedisStore`] when running more than
/// one process.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    plain: HashMap<String, (String, Option<Instant>)>,
    hashes: HashMap<String, (HashMap<String, String>, Option<Instant>)>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

fn expired(deadline: &Option<Instant>) -> bool {
    deadline.map(|d| Instant::now() >= d).unwrap_or(false)
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.inner.lock().map_err(|e| StoreError(e.to_string()))?;
        if let Some((_, deadline)) = inner.plain.get(key)
            && !expired(deadline)
        {
            return Ok(false);
        }
        inner.plain.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut inner = self.inner.lock().map_err(|e| StoreError(e.to_string()))?;
        match inner.plain.get(key) {
            Some((_, deadline)) if expired(deadline) => {
                inner.plain.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|e| StoreError(e.to_string()))?;
        inner.plain.remove(key);
        Ok(())
    }

    async fn hash_get(&self, bucket: &str, field: &str) -> StoreResult<Option<String>> {
        let mut inner = self.inner.lock().map_err(|e| StoreError(e.to_string()))?;
        match inner.hashes.get(bucket) {
            Some((_, deadline)) if expired(deadline) => {
                inner.hashes.remove(bucket);
                Ok(None)
            }
            Some((fields, _)) => Ok(fields.get(field).cloned()),
            None => Ok(None),
        }
    }

    async fn hash_set(&self, bucket: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|e| StoreError(e.to_string()))?;
        let entry = inner
            .hashes
            .entry(bucket.to_string())
            .or_insert_with(|| (HashMap::new(), None));
        entry.0.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|e| StoreError(e.to_string()))?;
        let deadline = Some(Instant::now() + ttl);
        if let Some(entry) = inner.plain.get_mut(key) {
            entry.1 = deadline;
        }
        if let Some(entry) = inner.hashes.get_mut(key) {
            entry.1 = deadline;
        }
        Ok(())
    }
}
