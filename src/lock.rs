//! Fingerprint locking for idempotent job execution
//!
//! Before a worker runs a job it acquires a short-lived exclusive lock keyed
//! by the job's [`Fingerprint`]. A second submission of the same work while
//! the first is in flight fails to acquire and is skipped without side
//! effects.
//!
//! The lock FAILS OPEN: when the shared store is absent or a store call
//! errors, acquisition reports success. Duplicate work is an acceptable
//! degradation; refusing all work because the store is down is not. Lock
//! entries carry a TTL so a crashed worker can never wedge a fingerprint
//! permanently.

use std::sync::Arc;
use std::time::Duration;

use crate::config::LockConfig;
use crate::fingerprint::Fingerprint;
use crate::store::SharedStore;

/// Manages fingerprint locks in the shared store
#[derive(Clone)]
pub struct LockManager {
    store: Option<Arc<dyn SharedStore>>,
    prefix: String,
    ttl: Duration,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("store", &self.store.is_some())
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl LockManager {
    /// Create a lock manager over an optional shared store
    ///
    /// `store: None` means every acquire succeeds (fail-open with no
    /// infrastructure at all).
    pub fn new(store: Option<Arc<dyn SharedStore>>, config: &LockConfig) -> Self {
        Self {
            store,
            prefix: config.key_prefix.clone(),
            ttl: config.ttl,
        }
    }

    fn key(&self, fingerprint: &Fingerprint) -> String {
        format!("{}:{}", self.prefix, fingerprint.as_str())
    }

    /// Attempt to acquire the lock for a fingerprint
    ///
    /// Returns true when this caller now holds the lock (or the store is
    /// unavailable and the lock fails open), false when another holder has
    /// a live lock on the same fingerprint.
    pub async fn acquire(&self, fingerprint: &Fingerprint) -> bool {
        let Some(store) = &self.store else {
            return true;
        };
        let key = self.key(fingerprint);
        match store.set_if_absent(&key, "1", self.ttl).await {
            Ok(acquired) => {
                if !acquired {
                    tracing::debug!(key = %key, "Fingerprint lock contended");
                }
                acquired
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Lock store unavailable, failing open");
                true
            }
        }
    }

    /// Check whether a fingerprint is currently held, without acquiring
    ///
    /// Used by submission as a fast duplicate reject. Advisory only: the
    /// authoritative check is the worker-side [`acquire`](Self::acquire).
    /// Reads fail open (a store error reports "not held").
    pub async fn is_held(&self, fingerprint: &Fingerprint) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let key = self.key(fingerprint);
        match store.get(&key).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Lock store unavailable, treating as not held");
                false
            }
        }
    }

    /// Release a held lock
    ///
    /// Called by the worker in all terminal paths, success and failure alike.
    /// A failed release is logged and otherwise ignored; the TTL bounds how
    /// long the stale entry can block duplicates.
    pub async fn release(&self, fingerprint: &Fingerprint) {
        let Some(store) = &self.store else {
            return;
        };
        let key = self.key(fingerprint);
        if let Err(e) = store.delete(&key).await {
            tracing::warn!(key = %key, error = %e, "Failed to release fingerprint lock");
        }
    }
}
