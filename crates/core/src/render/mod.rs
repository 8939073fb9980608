use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::capture::{
    CancelToken, CaptureOptions, CaptureReport, FrameCapturePipeline, LogProgress,
    ProgressReporter, StagingStore,
};
use crate::encode::{unique_output_path, EncodeJob, EncoderBridge, Ffprobe, MediaProbe, VideoEncoder};
use crate::surface::RenderSurface;
use crate::{AppConfig, Choreography, RenderError, Result, Timeline};

/// Summary of a successful offline render.
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub output: PathBuf,
    pub audio_seconds: f64,
    pub fps: u32,
    pub capture: CaptureReport,
    pub elapsed: Duration,
}

impl RenderReport {
    /// Length of the muxed video: the shorter of the two streams.
    pub fn video_seconds(&self) -> f64 {
        let frames = self.capture.frames as f64 / f64::from(self.fps);
        frames.min(self.audio_seconds)
    }

    /// Seconds of audio rendered per wall-clock second.
    pub fn realtime_factor(&self) -> f64 {
        let elapsed = self.elapsed.as_secs_f64();
        if elapsed <= 0.0 {
            return f64::INFINITY;
        }
        self.audio_seconds / elapsed
    }
}

/// Drives one offline render from input files to a muxed video.
///
/// Every failure aborts the whole run. Staged frames are removed after a
/// successful encode or a cancellation and are otherwise left on disk.
pub struct OfflineRenderer {
    config: AppConfig,
    probe: Box<dyn MediaProbe>,
    encoder: Box<dyn VideoEncoder>,
    progress: Box<dyn ProgressReporter>,
    cancel: CancelToken,
}

impl OfflineRenderer {
    pub fn new(config: AppConfig) -> Self {
        let probe = Ffprobe::new(config.encoder.ffprobe.clone());
        let encoder = EncoderBridge::new(config.encoder.clone());
        Self {
            config,
            probe: Box::new(probe),
            encoder: Box::new(encoder),
            progress: Box::new(LogProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn MediaProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_encoder(mut self, encoder: Box<dyn VideoEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Renders `choreography` against `audio`.
    ///
    /// `open_surface` is only called once the inputs have been validated and
    /// the timeline planned.
    pub fn render<S, F>(
        self,
        choreography: &Path,
        audio: &Path,
        open_surface: F,
    ) -> Result<RenderReport>
    where
        S: RenderSurface,
        F: FnOnce() -> Result<S>,
    {
        let started = Instant::now();
        require_file("choreography", choreography)?;
        require_file("audio", audio)?;

        tracing::info!(path = %choreography.display(), "loading choreography");
        let choreography = Choreography::load(choreography)?;

        tracing::info!(path = %audio.display(), "probing audio");
        let audio_seconds = self.probe.duration_seconds(audio)?;
        choreography.check_against_audio(audio_seconds);

        let render = &self.config.render;
        let timeline = Timeline::plan(audio_seconds, render.fps)?;
        tracing::info!(
            duration = audio_seconds,
            frames = timeline.len(),
            fps = render.fps,
            "timeline planned"
        );

        let mut store = StagingStore::recreate(&render.staging_dir)?;
        let pipeline = FrameCapturePipeline::new(CaptureOptions::from(render))
            .with_progress(self.progress)
            .with_cancel(self.cancel);
        let capture = capture_frames(
            &self.config,
            &choreography,
            &timeline,
            &mut store,
            open_surface,
            pipeline,
        );
        let capture = match capture {
            Ok(capture) => capture,
            Err(err) => return Err(discard_or_keep(store, err)),
        };

        let output =
            unique_output_path(&render.output_dir, &render.output_prefix, chrono::Utc::now());
        let job = EncodeJob {
            frames_pattern: store.input_pattern(),
            audio: audio.to_path_buf(),
            fps: render.fps,
            output,
        };
        let output = match self.encoder.encode(&job) {
            Ok(output) => output,
            Err(err) => return Err(discard_or_keep(store, err)),
        };

        tracing::info!(dir = %store.dir().display(), "cleaning up staged frames");
        store.remove()?;

        let report = RenderReport {
            output,
            audio_seconds,
            fps: render.fps,
            capture,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            output = %report.output.display(),
            elapsed = report.elapsed.as_secs_f64(),
            realtime = report.realtime_factor(),
            "render complete"
        );
        Ok(report)
    }
}

fn capture_frames<S, F>(
    config: &AppConfig,
    choreography: &Choreography,
    timeline: &Timeline,
    store: &mut StagingStore,
    open_surface: F,
    pipeline: FrameCapturePipeline,
) -> Result<CaptureReport>
where
    S: RenderSurface,
    F: FnOnce() -> Result<S>,
{
    let viewport = config.render.viewport;
    let mut surface = open_surface()?;
    surface.set_viewport(viewport.width, viewport.height)?;
    surface.inject(choreography)?;

    let mut pipeline = pipeline;
    pipeline.capture_all(timeline, &mut surface, store)
}

fn require_file(kind: &'static str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(RenderError::InputNotFound {
            kind,
            path: path.to_path_buf(),
        })
    }
}

fn discard_or_keep(store: StagingStore, err: RenderError) -> RenderError {
    if err.preserves_staging() {
        tracing::warn!(dir = %store.dir().display(), "keeping staged frames for inspection");
        return err;
    }
    if let Err(cleanup) = store.remove() {
        tracing::warn!(%cleanup, "failed to remove staged frames");
    }
    err
}
