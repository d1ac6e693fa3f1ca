//! Format selection engine
//!
//! Pure ranking of raw extraction-engine format candidates into at most one
//! deliverable option per quality tier. No I/O, no clocks, no randomness:
//! the same candidate list and constraints always produce the same output,
//! in ascending tier order.

use serde::{Deserialize, Serialize};

use crate::config::SelectionConfig;

/// A raw format advertised by the extraction engine for one target
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormatCandidate {
    /// Engine-side format identifier, passed back verbatim on fetch
    pub format_id: String,
    /// Vertical resolution class (1080 for 1920x1080), None for audio-only
    pub height: Option<u32>,
    /// True when the stream embeds an audio track (no merge step needed)
    pub has_audio: bool,
    /// Video codec string as reported (e.g. "avc1.640028"), None if unknown
    pub vcodec: Option<String>,
    /// Container extension (e.g. "mp4", "webm")
    pub container: String,
    /// Exact size in bytes when the engine knows it
    pub filesize: Option<u64>,
    /// Total bitrate in kbit/s, used to estimate size when filesize is absent
    pub tbr: Option<f64>,
}

impl FormatCandidate {
    /// Estimated artifact size in bytes
    ///
    /// Exact size when known, otherwise bitrate times duration
    /// (kbit/s * secs * 125 = bytes). None when neither is available.
    pub fn estimated_size(&self, duration_secs: Option<f64>) -> Option<u64> {
        if let Some(size) = self.filesize {
            return Some(size);
        }
        match (self.tbr, duration_secs) {
            (Some(tbr), Some(dur)) if tbr > 0.0 && dur > 0.0 => Some((tbr * dur * 125.0) as u64),
            _ => None,
        }
    }
}

/// One deliverable option, at most one per quality tier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedFormat {
    /// The tier this option fills
    pub tier: u32,
    /// Engine-side format identifier to fetch
    pub format_id: String,
    /// True when delivering this format requires a separate audio merge
    pub requires_audio_merge: bool,
    /// Container extension
    pub container: String,
    /// Estimated size in bytes, None when the engine gave no usable figures
    pub estimated_size: Option<u64>,
}

/// Rank candidates into at most one deliverable option per tier
///
/// Per tier: progressive candidates beat audio-less ones; within each group
/// the winner is the best `(codec priority, bitrate)` pair; anything whose
/// estimated size exceeds the ceiling is discarded outright, never
/// downgraded to a smaller tier. When no tier survives, falls back to the
/// configured universal format id if (and only if) the engine advertised
/// it. Output is ascending by tier.
pub fn select(
    candidates: &[FormatCandidate],
    duration_secs: Option<f64>,
    config: &SelectionConfig,
) -> Vec<SelectedFormat> {
    let mut tiers: Vec<u32> = config.tiers.clone();
    tiers.sort_unstable();

    let mut selected = Vec::new();
    for &tier in &tiers {
        let in_tier: Vec<&FormatCandidate> = candidates
            .iter()
            .filter(|c| c.height == Some(tier))
            .filter(|c| within_ceiling(c, duration_secs, config.max_bytes_per_tier))
            .collect();
        if in_tier.is_empty() {
            continue;
        }

        let progressive = best_of(in_tier.iter().copied().filter(|c| c.has_audio), config);
        let audio_less = best_of(in_tier.iter().copied().filter(|c| !c.has_audio), config);

        if let Some(winner) = progressive.or(audio_less) {
            selected.push(SelectedFormat {
                tier,
                format_id: winner.format_id.clone(),
                requires_audio_merge: !winner.has_audio,
                container: winner.container.clone(),
                estimated_size: winner.estimated_size(duration_secs),
            });
        }
    }

    if selected.is_empty()
        && let Some(universal_id) = &config.universal_format_id
        && let Some(universal) = candidates.iter().find(|c| &c.format_id == universal_id)
        && within_ceiling(universal, duration_secs, config.max_bytes_per_tier)
    {
        selected.push(SelectedFormat {
            tier: universal.height.unwrap_or(0),
            format_id: universal.format_id.clone(),
            requires_audio_merge: !universal.has_audio,
            container: universal.container.clone(),
            estimated_size: universal.estimated_size(duration_secs),
        });
    }

    selected
}

/// A candidate with an unknown size passes; the ceiling only discards
/// candidates known (or estimated) to exceed it.
fn within_ceiling(c: &FormatCandidate, duration_secs: Option<f64>, max_bytes: u64) -> bool {
    match c.estimated_size(duration_secs) {
        Some(size) => size <= max_bytes,
        None => true,
    }
}

/// Best candidate by (codec priority, bitrate), deterministic
fn best_of<'a>(
    group: impl Iterator<Item = &'a FormatCandidate>,
    config: &SelectionConfig,
) -> Option<&'a FormatCandidate> {
    group.min_by(|a, b| {
        codec_rank(a, config)
            .cmp(&codec_rank(b, config))
            .then_with(|| {
                // higher bitrate wins inside the same codec class
                let a_tbr = a.tbr.unwrap_or(0.0);
                let b_tbr = b.tbr.unwrap_or(0.0);
                b_tbr.partial_cmp(&a_tbr).unwrap_or(std::cmp::Ordering::Equal)
            })
            // stable final tiebreak so selection never depends on input order
            .then_with(|| a.format_id.cmp(&b.format_id))
    })
}

/// Position of the candidate's codec in the priority list; unknown codecs
/// rank after every listed one.
fn codec_rank(c: &FormatCandidate, config: &SelectionConfig) -> usize {
    let Some(vcodec) = &c.vcodec else {
        return config.codec_priority.len();
    };
    config
        .codec_priority
        .iter()
        .position(|p| vcodec.starts_with(p.as_str()))
        .unwrap_or(config.codec_priority.len())
}
