//! Core library for rendering visualiser choreographies to video.
//!
//! The offline path plans a timeline from the audio duration, drives an
//! external render surface to each frame's timestamp, stages one lossless
//! still per frame and muxes the sequence with the audio track. The live path
//! records from the same surface while it hot-swaps visual systems. Both
//! share the continuity policy that repeats the last good frame whenever the
//! surface momentarily has nothing to draw on.

pub mod capture;
pub mod choreography;
pub mod config;
pub mod continuity;
pub mod encode;
pub mod error;
pub mod record;
pub mod render;
pub mod surface;
pub mod timeline;

pub use capture::{CancelToken, FrameCapturePipeline, ProgressReporter, ProgressUpdate, StagingStore};
pub use choreography::{Choreography, Sequence};
pub use config::{AppConfig, EncoderConfig, LiveConfig, RenderConfig, SurfaceConfig};
pub use continuity::{resolve, CaptureOutcome, ContinuityBuffer, ContinuityStats};
pub use encode::{EncoderBridge, MediaProbe, VideoEncoder};
pub use error::{RenderError, Result};
pub use record::{LiveAssessment, LiveHarness, LiveSession, RecordingState, Studio};
pub use render::{OfflineRenderer, RenderReport};
pub use surface::{Capture, FrameImage, ProcessSurface, RenderSurface, ScriptedSurface, VisualSystem};
pub use timeline::{FrameDescriptor, Timeline};
