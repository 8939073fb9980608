//! Bridges to the external media tools: `ffprobe` for the audio duration and
//! `ffmpeg` for muxing the staged frames with the audio track.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{DateTime, Utc};

use crate::config::EncoderConfig;
use crate::{RenderError, Result};

/// Source of the audio duration that sizes the timeline.
pub trait MediaProbe {
    fn duration_seconds(&self, audio: &Path) -> Result<f64>;
}

/// Muxes a staged frame sequence with an audio track into one video file.
pub trait VideoEncoder {
    fn encode(&self, job: &EncodeJob) -> Result<PathBuf>;
}

/// [`MediaProbe`] backed by the `ffprobe` executable.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    program: String,
}

impl Ffprobe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MediaProbe for Ffprobe {
    fn duration_seconds(&self, audio: &Path) -> Result<f64> {
        probe_duration(&self.program, audio)
    }
}

/// Returns true when `program -version` runs successfully.
pub fn is_tool_on_path(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Asks `ffprobe` for the container duration of `audio`, in seconds.
pub fn probe_duration(ffprobe: &str, audio: &Path) -> Result<f64> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(audio)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| {
            RenderError::InvalidDuration(format!(
                "failed to run {ffprobe} (is it installed and on PATH?): {err}"
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RenderError::InvalidDuration(format!(
            "{ffprobe} failed for '{}': {}",
            audio.display(),
            stderr.trim()
        )));
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout))
}

/// Parses the single seconds value printed by the probe.
pub fn parse_duration(stdout: &str) -> Result<f64> {
    let text = stdout.trim();
    let seconds: f64 = text
        .parse()
        .map_err(|_| RenderError::InvalidDuration(format!("probe printed `{text}`")))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(RenderError::InvalidDuration(format!(
            "probe reported {seconds}s"
        )));
    }
    Ok(seconds)
}

/// Output file name carrying the generation time, e.g.
/// `vib34d-video-20260101T120000123.mp4`.
pub fn output_file_name(prefix: &str, generated_at: DateTime<Utc>) -> String {
    format!("{prefix}-{}.mp4", generated_at.format("%Y%m%dT%H%M%S%3f"))
}

/// Path in `dir` for a new output. A numeric suffix is added when a file of
/// the timestamped name already exists.
pub fn unique_output_path(dir: &Path, prefix: &str, generated_at: DateTime<Utc>) -> PathBuf {
    let name = output_file_name(prefix, generated_at);
    let first = dir.join(&name);
    if !first.exists() {
        return first;
    }
    let stem = name.trim_end_matches(".mp4");
    (1u32..)
        .map(|n| dir.join(format!("{stem}-{n}.mp4")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// One encode job: a staged image sequence plus one audio track.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// printf-style pattern of the staged frames.
    pub frames_pattern: PathBuf,
    pub audio: PathBuf,
    pub fps: u32,
    pub output: PathBuf,
}

/// Invokes `ffmpeg` to mux a frame sequence with an audio track.
#[derive(Debug, Clone)]
pub struct EncoderBridge {
    config: EncoderConfig,
}

impl EncoderBridge {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Arguments for one job: H.264 video, AAC audio, and `-shortest` so the
    /// longer stream is truncated to the shorter one.
    pub fn arguments(&self, job: &EncodeJob) -> Vec<OsString> {
        let fps = job.fps.to_string();
        let crf = self.config.crf.to_string();

        let mut args: Vec<OsString> = ["-y", "-loglevel", "error", "-framerate", fps.as_str(), "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(job.frames_pattern.clone().into_os_string());
        args.push("-i".into());
        args.push(job.audio.clone().into_os_string());
        args.extend(
            [
                "-map",
                "0:v:0",
                "-map",
                "1:a:0",
                "-c:v",
                "libx264",
                "-preset",
                self.config.preset.as_str(),
                "-crf",
                crf.as_str(),
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-b:a",
                self.config.audio_bitrate.as_str(),
                "-shortest",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(job.output.clone().into_os_string());
        args
    }
}

impl VideoEncoder for EncoderBridge {
    /// Runs the encoder and returns the path of the written video.
    fn encode(&self, job: &EncodeJob) -> Result<PathBuf> {
        if let Some(parent) = job.output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(
            output = %job.output.display(),
            fps = job.fps,
            "encoding video"
        );
        let output = Command::new(&self.config.ffmpeg)
            .args(self.arguments(job))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| RenderError::EncoderUnavailable {
                program: self.config.ffmpeg.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RenderError::EncodeFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(job.output.clone())
    }
}
