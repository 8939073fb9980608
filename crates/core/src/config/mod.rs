use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{RenderError, Result};

/// Frame rate used by the offline renderer.
pub const OFFLINE_FPS: u32 = 30;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub render: RenderConfig,
    pub surface: SurfaceConfig,
    pub encoder: EncoderConfig,
    pub live: LiveConfig,
}

impl AppConfig {
    /// Loads a JSON configuration file. Missing fields fall back to their
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(RenderError::InputNotFound {
                kind: "config",
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Settings for the offline capture loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub fps: u32,
    /// Delay between a seek and the capture of the redrawn viewport.
    pub settle_ms: u64,
    pub viewport: Viewport,
    /// Emit a progress update every `progress_interval` frames.
    pub progress_interval: u64,
    pub staging_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_prefix: String,
    /// Longest run of consecutive buffered frames tolerated without a warning.
    pub max_transition_frames: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: OFFLINE_FPS,
            settle_ms: 50,
            viewport: Viewport::default(),
            progress_interval: 10,
            staging_dir: PathBuf::from("frames"),
            output_dir: PathBuf::from("."),
            output_prefix: "vib34d-video".to_string(),
            max_transition_frames: 30,
        }
    }
}

impl RenderConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// How to launch the process hosting the render surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            command: "vib34d-surface".to_string(),
            args: Vec::new(),
        }
    }
}

/// External encoder and probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub preset: String,
    pub crf: u8,
    pub audio_bitrate: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            preset: "fast".to_string(),
            crf: 18,
            audio_bitrate: "192k".to_string(),
        }
    }
}

/// Settings for the live recording harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub tick_hz: u32,
    pub switch_interval_ms: u64,
    pub staging_dir: PathBuf,
    /// Longest run of consecutive zero-context ticks tolerated without a
    /// warning.
    pub max_transition_ticks: u64,
    /// A take that records fewer frames than this fails its assessment.
    pub min_frames: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            tick_hz: 60,
            switch_interval_ms: 3_000,
            staging_dir: PathBuf::from("live-frames"),
            max_transition_ticks: 30,
            min_frames: 100,
        }
    }
}

impl LiveConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    pub fn switch_interval(&self) -> Duration {
        Duration::from_millis(self.switch_interval_ms)
    }
}
