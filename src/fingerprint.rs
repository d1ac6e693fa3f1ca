//! Stable job identity for deduplication
//!
//! A fingerprint is derived from a job's semantic parameters — kind, target,
//! requester — so two submissions asking for the same work always collide on
//! the same key, regardless of when or where they were submitted. Fetch jobs
//! hash the normalized target URL; broadcast jobs key on the campaign id
//! (campaign operations are global, not per-requester).

use sha2::{Digest, Sha256};

use crate::types::Job;

/// Stable identity string for a job, used as the lock key suffix
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derive the fingerprint for a job
    pub fn for_job(job: &Job) -> Self {
        let key = match job {
            Job::VideoFetch { url, requester, .. } => {
                format!("video:{requester}:{}", url_hash(url))
            }
            Job::AudioFetch {
                video_id,
                requester,
            } => format!("audio:{requester}:{video_id}"),
            Job::BroadcastSend { campaign_id } => format!("broadcast:send:{campaign_id}"),
            Job::BroadcastEdit { campaign_id, .. } => format!("broadcast:edit:{campaign_id}"),
            Job::BroadcastDelete { campaign_id } => format!("broadcast:delete:{campaign_id}"),
        };
        Self(key)
    }

    /// The fingerprint as a store key suffix
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content hash used for result-cache addressing
    ///
    /// Unlike the lock key, the cache hash deliberately excludes the
    /// requester: two users fetching the same URL share one cached artifact.
    pub fn cache_hash(job: &Job) -> Option<String> {
        match job {
            Job::VideoFetch {
                url,
                format_id,
                output_ext,
                ..
            } => {
                let mut hasher = Sha256::new();
                hasher.update(normalize_url(url).as_bytes());
                if let Some(fmt) = format_id {
                    hasher.update(b":");
                    hasher.update(fmt.as_bytes());
                }
                if let Some(ext) = output_ext {
                    hasher.update(b"#");
                    hasher.update(ext.as_bytes());
                }
                Some(format!("{:x}", hasher.finalize()))
            }
            Job::AudioFetch { video_id, .. } => {
                let mut hasher = Sha256::new();
                hasher.update(b"audio:");
                hasher.update(video_id.as_bytes());
                Some(format!("{:x}", hasher.finalize()))
            }
            // Broadcast jobs produce no cacheable artifact
            Job::BroadcastSend { .. }
            | Job::BroadcastEdit { .. }
            | Job::BroadcastDelete { .. } => None,
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Truncated sha256 of the normalized URL (16 hex chars)
fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_url(url).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Normalize a URL so trivial variations collide on the same fingerprint
///
/// Lowercases the scheme and host and strips any fragment. Invalid URLs are
/// fingerprinted verbatim; validation happens at submission, not here.
fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => raw.trim().to_string(),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn video_job(url: &str, requester: i64) -> Job {
        Job::VideoFetch {
            url: url.into(),
            requester,
            format_id: None,
            output_ext: None,
        }
    }

    #[test]
    fn identical_video_jobs_share_a_fingerprint() {
        let a = Fingerprint::for_job(&video_job("https://example.com/watch?v=abc", 10));
        let b = Fingerprint::for_job(&video_job("https://example.com/watch?v=abc", 10));
        assert_eq!(a, b);
    }

    #[test]
    fn different_requesters_get_different_fingerprints() {
        let a = Fingerprint::for_job(&video_job("https://example.com/watch?v=abc", 10));
        let b = Fingerprint::for_job(&video_job("https://example.com/watch?v=abc", 11));
        assert_ne!(a, b, "dedup is per-requester for fetch jobs");
    }

    #[test]
    fn url_fragment_does_not_change_fingerprint() {
        let a = Fingerprint::for_job(&video_job("https://example.com/watch?v=abc#t=10", 10));
        let b = Fingerprint::for_job(&video_job("https://example.com/watch?v=abc", 10));
        assert_eq!(a, b);
    }

    #[test]
    fn host_case_does_not_change_fingerprint() {
        let a = Fingerprint::for_job(&video_job("https://EXAMPLE.com/watch?v=abc", 10));
        let b = Fingerprint::for_job(&video_job("https://example.com/watch?v=abc", 10));
        assert_eq!(a, b);
    }

    #[test]
    fn video_fingerprint_uses_truncated_hash() {
        let fp = Fingerprint::for_job(&video_job("https://example.com/v", 42));
        let parts: Vec<&str> = fp.as_str().split(':').collect();
        assert_eq!(parts[0], "video");
        assert_eq!(parts[1], "42");
        assert_eq!(parts[2].len(), 16, "URL hash is truncated to 16 hex chars");
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn audio_fingerprint_embeds_video_id_verbatim() {
        let fp = Fingerprint::for_job(&Job::AudioFetch {
            video_id: "dQw4w9WgXcQ".into(),
            requester: 7,
        });
        assert_eq!(fp.as_str(), "audio:7:dQw4w9WgXcQ");
    }

    #[test]
    fn broadcast_operations_have_distinct_fingerprints() {
        let send = Fingerprint::for_job(&Job::BroadcastSend { campaign_id: 3 });
        let edit = Fingerprint::for_job(&Job::BroadcastEdit {
            campaign_id: 3,
            new_text: "x".into(),
            new_media: None,
        });
        let delete = Fingerprint::for_job(&Job::BroadcastDelete { campaign_id: 3 });
        assert_eq!(send.as_str(), "broadcast:send:3");
        assert_ne!(send, edit);
        assert_ne!(edit, delete);
    }

    #[test]
    fn cache_hash_excludes_requester() {
        let a = Fingerprint::cache_hash(&video_job("https://example.com/v", 1)).unwrap();
        let b = Fingerprint::cache_hash(&video_job("https://example.com/v", 2)).unwrap();
        assert_eq!(a, b, "cached artifacts are shared across requesters");
    }

    #[test]
    fn cache_hash_varies_with_format_id() {
        let plain = Fingerprint::cache_hash(&video_job("https://example.com/v", 1)).unwrap();
        let with_format = Fingerprint::cache_hash(&Job::VideoFetch {
            url: "https://example.com/v".into(),
            requester: 1,
            format_id: Some("137".into()),
            output_ext: None,
        })
        .unwrap();
        assert_ne!(plain, with_format);
    }

    #[test]
    fn cache_hash_varies_with_output_ext() {
        let plain = Fingerprint::cache_hash(&video_job("https://example.com/v", 1)).unwrap();
        let with_ext = Fingerprint::cache_hash(&Job::VideoFetch {
            url: "https://example.com/v".into(),
            requester: 1,
            format_id: None,
            output_ext: Some("webm".into()),
        })
        .unwrap();
        assert_ne!(
            plain, with_ext,
            "a container override addresses a different artifact"
        );
    }

    #[test]
    fn broadcast_jobs_have_no_cache_hash() {
        assert!(Fingerprint::cache_hash(&Job::BroadcastSend { campaign_id: 1 }).is_none());
        assert!(Fingerprint::cache_hash(&Job::BroadcastDelete { campaign_id: 1 }).is_none());
    }

    #[test]
    fn unparseable_url_still_fingerprints() {
        let fp = Fingerprint::for_job(&video_job("not a url", 1));
        assert!(fp.as_str().starts_with("video:1:"));
    }
}
