use std::path::PathBuf;
use std::process::ExitStatus;

/// Result alias that carries the custom [`RenderError`] type.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Common error type for the core crate.
///
/// Every variant except [`RenderError::Message`] is fatal for the run that
/// produced it. Transient zero-surface frames never surface here; they are
/// absorbed by the continuity buffer.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// An input path does not resolve to an existing file.
    #[error("{kind} file not found: {}", path.display())]
    InputNotFound { kind: &'static str, path: PathBuf },
    /// The audio probe produced a non-positive or unparseable duration.
    #[error("invalid audio duration: {0}")]
    InvalidDuration(String),
    /// The choreography document is malformed.
    #[error("invalid choreography: {0}")]
    InvalidChoreography(String),
    /// The render surface could not be reached or instrumented at all.
    #[error("render surface unavailable: {0}")]
    SurfaceUnavailable(String),
    /// The render surface answered, but not in the expected shape.
    #[error("render surface protocol error: {0}")]
    SurfaceProtocol(String),
    /// Zero drawable contexts on a frame that has no earlier frame to fall
    /// back to.
    #[error("frame {frame_index} has no drawable surface and no earlier frame to reuse")]
    MissingFirstFrame { frame_index: u64 },
    /// The external encoder exited with a failure status.
    #[error("encoder exited with status {status}: {stderr}")]
    EncodeFailed { status: ExitStatus, stderr: String },
    /// The external encoder could not be launched at all.
    #[error("failed to launch encoder `{program}` (is it installed and on PATH?): {source}")]
    EncoderUnavailable {
        program: String,
        source: std::io::Error,
    },
    /// The run was cancelled between two frames.
    #[error("render cancelled")]
    Cancelled,
    /// `start` was requested on a session that is already recording.
    #[error("already recording")]
    AlreadyRecording,
    /// `stop` was requested on a session that is not recording.
    #[error("not recording")]
    NotRecording,
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn surface_unavailable<T: Into<String>>(msg: T) -> Self {
        Self::SurfaceUnavailable(msg.into())
    }

    pub fn protocol<T: Into<String>>(msg: T) -> Self {
        Self::SurfaceProtocol(msg.into())
    }

    /// Returns true when the staging directory should be kept on disk for
    /// inspection after this error.
    pub fn preserves_staging(&self) -> bool {
        !matches!(
            self,
            Self::InputNotFound { .. } | Self::InvalidDuration(_) | Self::Cancelled
        )
    }
}

impl From<&str> for RenderError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for RenderError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
