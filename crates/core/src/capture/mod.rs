//! Offline frame capture: drive the surface to each timeline timestamp and
//! stage one lossless still per frame.

mod staging;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::continuity::{CaptureOutcome, ContinuityBuffer, ContinuityStats};
use crate::surface::RenderSurface;
use crate::{RenderConfig, RenderError, Result, Timeline};

pub use staging::{FrameSink, MemorySink, StagingStore, FRAME_INDEX_WIDTH, MAX_STAGED_FRAMES};

/// Cooperative cancellation flag, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub completed: u64,
    pub total: u64,
}

impl ProgressUpdate {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 * 100.0 / self.total as f64
    }
}

/// Observer for capture progress. Purely a side channel.
pub trait ProgressReporter {
    fn report(&mut self, update: ProgressUpdate);

    fn finish(&mut self) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&mut self, update: ProgressUpdate) {
        tracing::info!(
            completed = update.completed,
            total = update.total,
            "rendered {:.1}%",
            update.percent()
        );
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    pub settle: Duration,
    pub progress_interval: u64,
    pub max_transition_frames: u64,
}

impl From<&RenderConfig> for CaptureOptions {
    fn from(config: &RenderConfig) -> Self {
        Self {
            settle: config.settle_delay(),
            progress_interval: config.progress_interval,
            max_transition_frames: config.max_transition_frames,
        }
    }
}

/// Outcome of a completed capture pass.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub frames: u64,
    pub stats: ContinuityStats,
    /// Continuity decision for every frame, in timeline order.
    pub outcomes: Vec<CaptureOutcome>,
}

/// Sequential seek/settle/capture loop over a timeline.
///
/// The surface carries a single mutable simulation clock, so frames are
/// never captured in parallel or out of order.
pub struct FrameCapturePipeline {
    options: CaptureOptions,
    progress: Box<dyn ProgressReporter>,
    cancel: CancelToken,
}

impl FrameCapturePipeline {
    pub fn new(options: CaptureOptions) -> Self {
        Self {
            options,
            progress: Box::new(LogProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Captures every timeline entry into `store`.
    ///
    /// Zero-context frames are resolved by the continuity buffer. The run
    /// aborts on the first unreachable surface, on a first frame with nothing
    /// to show, or when cancelled.
    pub fn capture_all<S>(
        &mut self,
        timeline: &Timeline,
        surface: &mut S,
        store: &mut StagingStore,
    ) -> Result<CaptureReport>
    where
        S: RenderSurface + ?Sized,
    {
        let total = timeline.len() as u64;
        if total > MAX_STAGED_FRAMES {
            return Err(RenderError::msg(format!(
                "timeline of {total} frames exceeds the staging limit of {MAX_STAGED_FRAMES}"
            )));
        }

        let interval = self.options.progress_interval.max(1);
        let mut buffer = ContinuityBuffer::new(self.options.max_transition_frames);
        let mut outcomes = Vec::with_capacity(timeline.len());

        tracing::info!(frames = total, fps = timeline.fps(), "capturing frames");
        for frame in timeline.iter() {
            if self.cancel.is_cancelled() {
                tracing::warn!(frame_index = frame.index, "capture cancelled");
                return Err(RenderError::Cancelled);
            }

            surface.seek(frame.timestamp_seconds)?;
            if !self.options.settle.is_zero() {
                std::thread::sleep(self.options.settle);
            }
            let capture = surface.capture()?;

            let resolution = buffer.admit(frame.index, &capture);
            let Some(pixels) = resolution.pixels else {
                return Err(RenderError::MissingFirstFrame {
                    frame_index: frame.index,
                });
            };
            store.stage(frame.index, &pixels)?;
            outcomes.push(resolution.outcome);

            if frame.index % interval == 0 || frame.index + 1 == total {
                self.progress.report(ProgressUpdate {
                    completed: frame.index + 1,
                    total,
                });
            }
        }
        self.progress.finish();

        let stats = buffer.stats();
        tracing::info!(
            frames = total,
            direct = stats.direct,
            buffered = stats.buffered,
            "frame capture complete"
        );
        Ok(CaptureReport {
            frames: total,
            stats,
            outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::surface::ScriptedSurface;

    fn options() -> CaptureOptions {
        CaptureOptions {
            settle: Duration::ZERO,
            progress_interval: 10,
            max_transition_frames: 30,
        }
    }

    #[derive(Clone, Default)]
    struct Recorded(Arc<Mutex<Vec<ProgressUpdate>>>);

    impl ProgressReporter for Recorded {
        fn report(&mut self, update: ProgressUpdate) {
            self.0.lock().unwrap().push(update);
        }
    }

    #[test]
    fn stages_one_frame_per_timeline_entry() {
        let root = tempfile::tempdir().unwrap();
        let mut store = StagingStore::recreate(root.path().join("frames")).unwrap();
        let mut surface = ScriptedSurface::new(4, 4);
        let timeline = Timeline::plan(1.0, 30).unwrap();

        let report = FrameCapturePipeline::new(options())
            .capture_all(&timeline, &mut surface, &mut store)
            .unwrap();

        assert_eq!(report.frames, 30);
        assert_eq!(report.stats.direct, 30);
        let paths = store.staged_paths().unwrap();
        assert_eq!(paths.len(), 30);
        for (index, path) in paths.iter().enumerate() {
            assert_eq!(path, &store.frame_path(index as u64));
        }
        let expected: Vec<f64> = timeline.iter().map(|f| f.timestamp_seconds).collect();
        assert_eq!(surface.seeks(), expected.as_slice());
    }

    #[test]
    fn zero_context_frames_repeat_previous_artifact() {
        let root = tempfile::tempdir().unwrap();
        let mut store = StagingStore::recreate(root.path().join("frames")).unwrap();
        let mut surface = ScriptedSurface::new(4, 4).with_context_schedule(vec![1, 1, 1, 1, 1, 0, 0, 1]);
        let timeline = Timeline::plan(8.0 / 30.0 + 1e-9, 30).unwrap();

        let report = FrameCapturePipeline::new(options())
            .capture_all(&timeline, &mut surface, &mut store)
            .unwrap();

        assert_eq!(report.outcomes[5], CaptureOutcome::Buffered);
        assert_eq!(report.outcomes[6], CaptureOutcome::Buffered);
        assert_eq!(report.outcomes[7], CaptureOutcome::Direct);
        let four = std::fs::read(store.frame_path(4)).unwrap();
        assert_eq!(std::fs::read(store.frame_path(5)).unwrap(), four);
        assert_eq!(std::fs::read(store.frame_path(6)).unwrap(), four);
        assert_ne!(std::fs::read(store.frame_path(7)).unwrap(), four);
    }

    #[test]
    fn first_frame_without_contexts_aborts() {
        let root = tempfile::tempdir().unwrap();
        let mut store = StagingStore::recreate(root.path().join("frames")).unwrap();
        let mut surface = ScriptedSurface::new(4, 4).with_context_schedule(vec![0]);
        let timeline = Timeline::plan(1.0, 30).unwrap();

        let err = FrameCapturePipeline::new(options())
            .capture_all(&timeline, &mut surface, &mut store)
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingFirstFrame { frame_index: 0 }));
        assert!(store.is_empty());
    }

    #[test]
    fn unreachable_surface_aborts_and_keeps_staged_frames() {
        let root = tempfile::tempdir().unwrap();
        let mut store = StagingStore::recreate(root.path().join("frames")).unwrap();
        let mut surface = ScriptedSurface::new(4, 4).with_disconnect_after(3);
        let timeline = Timeline::plan(1.0, 30).unwrap();

        let err = FrameCapturePipeline::new(options())
            .capture_all(&timeline, &mut surface, &mut store)
            .unwrap_err();
        assert!(matches!(err, RenderError::SurfaceUnavailable(_)));
        assert_eq!(store.staged_paths().unwrap().len(), 3);
    }

    #[test]
    fn cancellation_stops_between_frames() {
        let root = tempfile::tempdir().unwrap();
        let mut store = StagingStore::recreate(root.path().join("frames")).unwrap();
        let mut surface = ScriptedSurface::new(4, 4);
        let timeline = Timeline::plan(1.0, 30).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = FrameCapturePipeline::new(options())
            .with_cancel(cancel)
            .capture_all(&timeline, &mut surface, &mut store)
            .unwrap_err();
        assert!(matches!(err, RenderError::Cancelled));
        assert!(surface.seeks().is_empty());
    }

    #[test]
    fn progress_is_reported_at_interval_and_on_last_frame() {
        let root = tempfile::tempdir().unwrap();
        let mut store = StagingStore::recreate(root.path().join("frames")).unwrap();
        let mut surface = ScriptedSurface::new(2, 2);
        let timeline = Timeline::plan(25.0 / 30.0 + 1e-9, 30).unwrap();
        let recorded = Recorded::default();

        FrameCapturePipeline::new(options())
            .with_progress(Box::new(recorded.clone()))
            .capture_all(&timeline, &mut surface, &mut store)
            .unwrap();

        let completed: Vec<u64> = recorded.0.lock().unwrap().iter().map(|u| u.completed).collect();
        assert_eq!(completed, vec![1, 11, 21, 25]);
    }
}
