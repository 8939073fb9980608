use serde::{Deserialize, Serialize};

use crate::{RenderError, Result};

/// A single sample point on the render timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub index: u64,
    pub timestamp_seconds: f64,
}

/// Ordered, contiguous, zero-based list of frames to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    fps: u32,
    frames: Vec<FrameDescriptor>,
}

impl Timeline {
    /// Plans `floor(duration * fps)` frames at `index / fps` seconds each.
    ///
    /// A duration shorter than a single frame is rejected as well, since it
    /// would leave the encoder with nothing to mux.
    pub fn plan(duration_seconds: f64, fps: u32) -> Result<Self> {
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(RenderError::InvalidDuration(format!(
                "duration must be a positive number of seconds, got {duration_seconds}"
            )));
        }
        if fps == 0 {
            return Err(RenderError::msg("frame rate must be non-zero"));
        }

        let rate = f64::from(fps);
        let count = (duration_seconds * rate).floor() as u64;
        if count == 0 {
            return Err(RenderError::InvalidDuration(format!(
                "{duration_seconds}s is shorter than one frame at {fps} fps"
            )));
        }

        let frames = (0..count)
            .map(|index| FrameDescriptor {
                index,
                timestamp_seconds: index as f64 / rate,
            })
            .collect();

        Ok(Self { fps, frames })
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[FrameDescriptor] {
        &self.frames
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameDescriptor> {
        self.frames.iter()
    }

    /// Seconds of video covered by the planned frames.
    pub fn duration_seconds(&self) -> f64 {
        self.frames.len() as f64 / f64::from(self.fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_seconds_at_thirty_fps() {
        let timeline = Timeline::plan(10.0, 30).unwrap();
        assert_eq!(timeline.len(), 300);
        assert_eq!(timeline.frames()[0].timestamp_seconds, 0.0);
        let last = timeline.frames().last().unwrap();
        assert_eq!(last.index, 299);
        assert!((last.timestamp_seconds - 299.0 / 30.0).abs() < 1e-12);
        assert!((timeline.duration_seconds() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn frame_count_is_floored_and_contiguous() {
        for (duration, fps) in [(1.0, 1), (2.999, 30), (0.5, 60), (187.34, 30), (3.3, 7)] {
            let timeline = Timeline::plan(duration, fps).unwrap();
            assert_eq!(timeline.len() as u64, (duration * f64::from(fps)).floor() as u64);
            for (position, frame) in timeline.iter().enumerate() {
                assert_eq!(frame.index, position as u64);
            }
            for pair in timeline.frames().windows(2) {
                assert!(pair[1].timestamp_seconds > pair[0].timestamp_seconds);
            }
        }
    }

    #[test]
    fn rejects_non_positive_durations() {
        for duration in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = Timeline::plan(duration, 30).unwrap_err();
            assert!(matches!(err, RenderError::InvalidDuration(_)));
        }
    }

    #[test]
    fn rejects_sub_frame_durations() {
        let err = Timeline::plan(0.01, 30).unwrap_err();
        assert!(matches!(err, RenderError::InvalidDuration(_)));
    }

    #[test]
    fn rejects_zero_fps() {
        assert!(Timeline::plan(1.0, 0).is_err());
    }
}
