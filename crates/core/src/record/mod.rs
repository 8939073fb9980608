//! Live recording: an explicit `Idle`/`Recording` state machine fed by a
//! periodic tick, sharing the offline continuity policy.

mod harness;
mod studio;

use serde::{Deserialize, Serialize};

use crate::capture::FrameSink;
use crate::continuity::{CaptureOutcome, ContinuityBuffer};
use crate::surface::Capture;
use crate::{RenderError, Result};

pub use harness::{LiveAssessment, LiveHarness, DEFAULT_SWITCH_SCHEDULE};
pub use studio::{spawn_ticker, Studio, TickerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// Counters for one recording take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LiveStats {
    pub ticks: u64,
    pub frames: u64,
    pub zero_context_ticks: u64,
    pub buffered: u64,
    pub skipped: u64,
    pub overlong_gaps: u64,
    pub switches: u64,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The session was not recording; nothing was captured.
    Idle,
    Captured(CaptureOutcome),
    /// Zero contexts before any good frame existed; the tick was dropped.
    Skipped,
}

/// Recording session state plus the frames it has produced so far.
///
/// Visual-system switches are reported to the session for bookkeeping only;
/// they never change its state.
pub struct LiveSession {
    state: RecordingState,
    buffer: ContinuityBuffer,
    sink: Box<dyn FrameSink + Send>,
    stats: LiveStats,
    last_contexts: usize,
    /// Sink index of the next frame; keeps counting across takes.
    emitted: u64,
}

impl LiveSession {
    pub fn new(sink: Box<dyn FrameSink + Send>, max_transition_ticks: u64) -> Self {
        Self {
            state: RecordingState::Idle,
            buffer: ContinuityBuffer::new(max_transition_ticks),
            sink,
            stats: LiveStats::default(),
            last_contexts: 0,
            emitted: 0,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    pub fn stats(&self) -> LiveStats {
        self.stats
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state != RecordingState::Idle {
            return Err(RenderError::AlreadyRecording);
        }
        self.buffer.reset();
        self.stats = LiveStats::default();
        self.last_contexts = 0;
        self.state = RecordingState::Recording;
        tracing::info!("recording started");
        Ok(())
    }

    /// Ends the take and returns its counters.
    pub fn stop(&mut self) -> Result<LiveStats> {
        if self.state != RecordingState::Recording {
            return Err(RenderError::NotRecording);
        }
        self.state = RecordingState::Idle;
        tracing::info!(
            frames = self.stats.frames,
            buffered = self.stats.buffered,
            skipped = self.stats.skipped,
            "recording stopped"
        );
        Ok(self.stats)
    }

    pub(crate) fn note_switch(&mut self) {
        self.stats.switches += 1;
    }

    /// Feeds one video-frame tick through the continuity policy.
    ///
    /// Unlike the offline path, a tick with nothing to show is skipped
    /// rather than treated as fatal.
    pub fn tick(&mut self, capture: &Capture) -> Result<TickOutcome> {
        if !self.is_recording() {
            return Ok(TickOutcome::Idle);
        }

        let tick = self.stats.ticks;
        self.stats.ticks += 1;
        tracing::debug!(tick, contexts = capture.contexts, "recording frame");
        if capture.contexts == 0 {
            self.stats.zero_context_ticks += 1;
            if self.last_contexts > 0 {
                tracing::info!(tick, "0 canvases (was {})", self.last_contexts);
            }
        }
        self.last_contexts = capture.contexts;

        let resolution = self.buffer.admit(tick, capture);
        self.stats.overlong_gaps = self.buffer.stats().overlong_gaps;
        let Some(pixels) = resolution.pixels else {
            self.stats.skipped += 1;
            return Ok(TickOutcome::Skipped);
        };

        self.sink.accept(self.emitted, &pixels)?;
        self.emitted += 1;
        self.stats.frames += 1;
        if resolution.outcome == CaptureOutcome::Buffered {
            self.stats.buffered += 1;
        }
        Ok(TickOutcome::Captured(resolution.outcome))
    }
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::surface::FrameImage;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<(u64, FrameImage)>>>);

    impl FrameSink for SharedSink {
        fn accept(&mut self, index: u64, frame: &FrameImage) -> Result<()> {
            self.0.lock().unwrap().push((index, frame.clone()));
            Ok(())
        }
    }

    fn capture(contexts: usize, shade: u8) -> Capture {
        Capture {
            contexts,
            pixels: (contexts > 0).then(|| FrameImage::solid(2, 2, [shade, 0, 0, 255])),
        }
    }

    #[test]
    fn start_while_recording_fails_and_keeps_state() {
        let mut session = LiveSession::new(Box::new(SharedSink::default()), 30);
        session.start().unwrap();
        let err = session.start().unwrap_err();
        assert!(matches!(err, RenderError::AlreadyRecording));
        assert_eq!(session.state(), RecordingState::Recording);
    }

    #[test]
    fn stop_while_idle_fails() {
        let mut session = LiveSession::new(Box::new(SharedSink::default()), 30);
        assert!(matches!(session.stop().unwrap_err(), RenderError::NotRecording));
        assert_eq!(session.state(), RecordingState::Idle);
    }

    #[test]
    fn idle_ticks_capture_nothing() {
        let sink = SharedSink::default();
        let mut session = LiveSession::new(Box::new(sink.clone()), 30);
        assert_eq!(session.tick(&capture(1, 1)).unwrap(), TickOutcome::Idle);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn zero_context_ticks_skip_then_buffer() {
        let sink = SharedSink::default();
        let mut session = LiveSession::new(Box::new(sink.clone()), 30);
        session.start().unwrap();

        assert_eq!(session.tick(&capture(0, 0)).unwrap(), TickOutcome::Skipped);
        assert_eq!(
            session.tick(&capture(2, 7)).unwrap(),
            TickOutcome::Captured(CaptureOutcome::Direct)
        );
        assert_eq!(
            session.tick(&capture(0, 0)).unwrap(),
            TickOutcome::Captured(CaptureOutcome::Buffered)
        );

        let stats = session.stop().unwrap();
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.buffered, 1);
        assert_eq!(stats.zero_context_ticks, 2);

        let frames = sink.0.lock().unwrap();
        assert_eq!(frames[0].0, 0);
        assert_eq!(frames[1].0, 1);
        assert_eq!(frames[0].1, frames[1].1);
    }

    #[test]
    fn restarting_begins_a_fresh_take() {
        let mut session = LiveSession::new(Box::new(SharedSink::default()), 30);
        session.start().unwrap();
        session.tick(&capture(1, 3)).unwrap();
        session.stop().unwrap();

        session.start().unwrap();
        assert_eq!(session.stats(), LiveStats::default());
        assert_eq!(session.tick(&capture(0, 0)).unwrap(), TickOutcome::Skipped);
    }
}
