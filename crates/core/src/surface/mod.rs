//! Boundary to the external, stateful render surface.
//!
//! The surface owns the visualiser and its simulation clock. The pipeline
//! only ever talks to it through [`RenderSurface`], so a scripted in-process
//! surface can stand in for the real host process in tests.

mod process;
mod scripted;

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::{Choreography, RenderError, Result};

pub use process::{ProcessSurface, SurfaceClient};
pub use scripted::ScriptedSurface;

/// Visual systems the visualiser can switch between at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualSystem {
    Faceted,
    Quantum,
    Holographic,
}

impl VisualSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Faceted => "faceted",
            Self::Quantum => "quantum",
            Self::Holographic => "holographic",
        }
    }
}

impl fmt::Display for VisualSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured RGBA pixels of the full viewport.
///
/// Cloning is cheap; the pixel buffer is shared.
#[derive(Clone, PartialEq)]
pub struct FrameImage(Arc<RgbaImage>);

impl FrameImage {
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RenderError::protocol(format!(
                "expected {expected} bytes for a {width}x{height} frame, got {}",
                pixels.len()
            )));
        }
        RgbaImage::from_raw(width, height, pixels)
            .map(|image| Self(Arc::new(image)))
            .ok_or_else(|| RenderError::protocol("pixel buffer does not match frame size"))
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self(Arc::new(RgbaImage::from_pixel(width, height, image::Rgba(rgba))))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// True when both frames share the same pixel allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FrameImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Result of a single capture request.
#[derive(Debug, Clone)]
pub struct Capture {
    /// Drawable contexts active at capture time.
    pub contexts: usize,
    /// Viewport pixels, present only when at least one context was active.
    pub pixels: Option<FrameImage>,
}

impl Capture {
    pub fn empty() -> Self {
        Self {
            contexts: 0,
            pixels: None,
        }
    }
}

/// Capability object for the external render surface.
///
/// Calls are strictly sequential. Every method blocks until the surface has
/// acknowledged the request.
pub trait RenderSurface {
    fn set_viewport(&mut self, width: u32, height: u32) -> Result<()>;

    /// Hands the choreography to the surface before rendering starts.
    fn inject(&mut self, choreography: &Choreography) -> Result<()>;

    /// Moves the simulation clock to `seconds` and recomputes all dependent
    /// visual state.
    fn seek(&mut self, seconds: f64) -> Result<()>;

    /// Number of drawable contexts currently attached to the viewport.
    fn active_contexts(&mut self) -> Result<usize>;

    fn capture_viewport(&mut self) -> Result<FrameImage>;

    /// Swaps the active visual system. This may tear down every drawable
    /// context for a short while.
    fn switch_system(&mut self, system: VisualSystem) -> Result<()>;

    /// Samples the context count and grabs pixels when there is something to
    /// grab.
    fn capture(&mut self) -> Result<Capture> {
        let contexts = self.active_contexts()?;
        if contexts == 0 {
            return Ok(Capture::empty());
        }
        let pixels = self.capture_viewport()?;
        Ok(Capture {
            contexts,
            pixels: Some(pixels),
        })
    }
}

impl<S: RenderSurface + ?Sized> RenderSurface for Box<S> {
    fn set_viewport(&mut self, width: u32, height: u32) -> Result<()> {
        (**self).set_viewport(width, height)
    }

    fn inject(&mut self, choreography: &Choreography) -> Result<()> {
        (**self).inject(choreography)
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        (**self).seek(seconds)
    }

    fn active_contexts(&mut self) -> Result<usize> {
        (**self).active_contexts()
    }

    fn capture_viewport(&mut self) -> Result<FrameImage> {
        (**self).capture_viewport()
    }

    fn switch_system(&mut self, system: VisualSystem) -> Result<()> {
        (**self).switch_system(system)
    }

    fn capture(&mut self) -> Result<Capture> {
        (**self).capture()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_image_checks_buffer_size() {
        assert!(FrameImage::from_rgba(2, 2, vec![0; 16]).is_ok());
        let err = FrameImage::from_rgba(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, RenderError::SurfaceProtocol(_)));
    }

    #[test]
    fn visual_systems_serialise_lowercase() {
        assert_eq!(
            serde_json::to_string(&VisualSystem::Holographic).unwrap(),
            "\"holographic\""
        );
        assert_eq!(VisualSystem::Quantum.to_string(), "quantum");
    }

    #[test]
    fn capture_skips_pixels_without_contexts() {
        let mut surface = ScriptedSurface::new(4, 4).with_context_schedule(vec![0, 2]);
        surface.seek(0.0).unwrap();
        let first = surface.capture().unwrap();
        assert_eq!(first.contexts, 0);
        assert!(first.pixels.is_none());

        surface.seek(0.1).unwrap();
        let second = surface.capture().unwrap();
        assert_eq!(second.contexts, 2);
        assert!(second.pixels.is_some());
    }
}
