//! Frame-continuity policy shared by the offline pipeline and the live
//! recording session.
//!
//! While the visualiser hot-swaps its visual system the viewport can briefly
//! expose zero drawable contexts. Instead of emitting a blank frame the most
//! recent good frame is repeated. Only the very first frame has nothing to
//! fall back to.

use serde::Serialize;

use crate::surface::{Capture, FrameImage};

/// Per-frame classification of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureOutcome {
    /// At least one context was active; the captured pixels are used.
    Direct,
    /// No context was active; the last good frame is repeated.
    Buffered,
    /// No context was active and no earlier frame exists.
    Missing,
}

impl CaptureOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Buffered => "buffered",
            Self::Missing => "missing",
        }
    }
}

/// Pixels to stage for a frame together with how they were obtained.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub pixels: Option<FrameImage>,
    pub outcome: CaptureOutcome,
}

/// Applies the continuity policy to one capture.
///
/// Pure: the same inputs always give the same pixels and outcome. A capture
/// that claims active contexts but carries no pixels is treated like a
/// zero-context capture.
pub fn resolve(
    contexts: usize,
    captured: Option<&FrameImage>,
    last_good: Option<&FrameImage>,
) -> Resolution {
    match (contexts, captured) {
        (count, Some(pixels)) if count >= 1 => Resolution {
            pixels: Some(pixels.clone()),
            outcome: CaptureOutcome::Direct,
        },
        _ => match last_good {
            Some(pixels) => Resolution {
                pixels: Some(pixels.clone()),
                outcome: CaptureOutcome::Buffered,
            },
            None => Resolution {
                pixels: None,
                outcome: CaptureOutcome::Missing,
            },
        },
    }
}

/// Running tally of continuity decisions for a run or a recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContinuityStats {
    pub direct: u64,
    pub buffered: u64,
    pub missing: u64,
    /// Gaps of consecutive non-direct frames longer than the configured bound.
    pub overlong_gaps: u64,
    pub longest_gap: u64,
}

impl ContinuityStats {
    /// A run is clean when no frame was missing.
    pub fn is_clean(&self) -> bool {
        self.missing == 0
    }

    pub fn total(&self) -> u64 {
        self.direct + self.buffered + self.missing
    }
}

/// Stateful wrapper around [`resolve`] that remembers the last good frame.
///
/// The buffer only holds a shared handle to the pixels; the staged artifact
/// itself belongs to whoever persisted it.
#[derive(Debug)]
pub struct ContinuityBuffer {
    last_good: Option<FrameImage>,
    stats: ContinuityStats,
    gap: u64,
    max_gap: u64,
}

impl ContinuityBuffer {
    /// `max_gap` bounds the expected transition window, in frames.
    pub fn new(max_gap: u64) -> Self {
        Self {
            last_good: None,
            stats: ContinuityStats::default(),
            gap: 0,
            max_gap,
        }
    }

    pub fn last_good(&self) -> Option<&FrameImage> {
        self.last_good.as_ref()
    }

    pub fn stats(&self) -> ContinuityStats {
        self.stats
    }

    /// Resets the buffer for a new run, forgetting the last good frame.
    pub fn reset(&mut self) {
        self.last_good = None;
        self.stats = ContinuityStats::default();
        self.gap = 0;
    }

    /// Resolves one capture, updates the last good frame and records the
    /// decision.
    pub fn admit(&mut self, frame_index: u64, capture: &Capture) -> Resolution {
        let resolution = resolve(
            capture.contexts,
            capture.pixels.as_ref(),
            self.last_good.as_ref(),
        );

        match resolution.outcome {
            CaptureOutcome::Direct => {
                self.stats.direct += 1;
                self.gap = 0;
                self.last_good = resolution.pixels.clone();
                tracing::debug!(
                    frame_index,
                    contexts = capture.contexts,
                    outcome = "direct",
                    "frame captured"
                );
            }
            CaptureOutcome::Buffered => {
                self.stats.buffered += 1;
                self.note_gap(frame_index);
                tracing::debug!(
                    frame_index,
                    contexts = capture.contexts,
                    outcome = "buffered",
                    "using buffered frame"
                );
            }
            CaptureOutcome::Missing => {
                self.stats.missing += 1;
                self.note_gap(frame_index);
                tracing::warn!(
                    frame_index,
                    contexts = capture.contexts,
                    outcome = "missing",
                    "no frame to capture"
                );
            }
        }

        resolution
    }

    fn note_gap(&mut self, frame_index: u64) {
        self.gap += 1;
        self.stats.longest_gap = self.stats.longest_gap.max(self.gap);
        if self.gap == self.max_gap.saturating_add(1) {
            self.stats.overlong_gaps += 1;
            tracing::warn!(
                frame_index,
                bound = self.max_gap,
                "zero-context window outlasted the expected transition bound"
            );
        }
    }
}
