//! Periodic scratch directory sweep
//!
//! Workers never delete their own artifacts; delivery may still be reading
//! a file when its worker moves on, and a crashed worker deletes nothing at
//! all. Instead this sweep removes scratch files purely by age, on a fixed
//! interval, independent of whatever produced them.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::config::StorageConfig;

/// Spawn the background sweep task
///
/// Runs until the cancellation token fires. Each pass is independent; a
/// failed pass is logged and the next tick tries again.
pub(crate) fn spawn_sweeper(
    config: StorageConfig,
    cancel_token: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the immediate first tick would sweep at startup; skip it
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match sweep_once(&config.scratch_dir, config.scratch_max_age).await {
                        Ok(removed) if removed > 0 => {
                            tracing::info!(removed, "Scratch sweep removed stale files");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "Scratch sweep pass failed");
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    })
}

/// Remove files in `dir` whose modification time is older than `max_age`
///
/// Subdirectories are left alone; only plain files are swept. Returns the
/// number of files removed. Individual removal failures are logged and the
/// pass continues.
pub async fn sweep_once(dir: &Path, max_age: Duration) -> std::io::Result<u64> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        // no scratch dir yet means nothing to sweep
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0u64;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok());
        let Some(age) = age else {
            continue;
        };
        if age > max_age {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    tracing::debug!(
                        path = %entry.path().display(),
                        age_secs = age.as_secs(),
                        "Swept stale scratch file"
                    );
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Failed to sweep file");
                }
            }
        }
    }

    Ok(removed)
}
