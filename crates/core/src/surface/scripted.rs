use std::collections::VecDeque;

use crate::surface::{FrameImage, RenderSurface, VisualSystem};
use crate::{Choreography, RenderError, Result};

/// Deterministic in-process surface.
///
/// Pixels are a solid colour derived from the simulated clock and the active
/// visual system, so two captures at the same timestamp are identical. The
/// number of active contexts can be scripted per query to reproduce
/// hot-swap gaps exactly.
#[derive(Debug)]
pub struct ScriptedSurface {
    width: u32,
    height: u32,
    time: f64,
    system: VisualSystem,
    schedule: VecDeque<usize>,
    settled_contexts: usize,
    switch_gap: usize,
    gap_remaining: usize,
    disconnect_after: Option<usize>,
    disconnected: bool,
    choreography: Option<Choreography>,
    seeks: Vec<f64>,
    switches: Vec<VisualSystem>,
}

impl ScriptedSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            time: 0.0,
            system: VisualSystem::Faceted,
            schedule: VecDeque::new(),
            settled_contexts: 1,
            switch_gap: 0,
            gap_remaining: 0,
            disconnect_after: None,
            disconnected: false,
            choreography: None,
            seeks: Vec::new(),
            switches: Vec::new(),
        }
    }

    /// Context counts returned by successive [`RenderSurface::active_contexts`]
    /// queries. Once exhausted the surface reports one context.
    pub fn with_context_schedule(mut self, schedule: Vec<usize>) -> Self {
        self.schedule = schedule.into();
        self
    }

    /// Number of context queries that report zero after each system switch.
    pub fn with_switch_gap(mut self, queries: usize) -> Self {
        self.switch_gap = queries;
        self
    }

    /// Makes every call fail as unreachable once `seeks` seeks have been served.
    pub fn with_disconnect_after(mut self, seeks: usize) -> Self {
        self.disconnect_after = Some(seeks);
        self
    }

    pub fn seeks(&self) -> &[f64] {
        &self.seeks
    }

    pub fn switches(&self) -> &[VisualSystem] {
        &self.switches
    }

    pub fn system(&self) -> VisualSystem {
        self.system
    }

    pub fn injected(&self) -> Option<&Choreography> {
        self.choreography.as_ref()
    }

    /// Pixels the surface draws for a given clock value and system.
    pub fn frame_at(&self, seconds: f64, system: VisualSystem) -> FrameImage {
        let step = (seconds * 30.0).round() as u64;
        let tint = match system {
            VisualSystem::Faceted => 40,
            VisualSystem::Quantum => 140,
            VisualSystem::Holographic => 240,
        };
        let rgba = [(step % 256) as u8, tint, ((step / 256) % 256) as u8, 255];
        FrameImage::solid(self.width, self.height, rgba)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.disconnected {
            return Err(RenderError::surface_unavailable(
                "scripted surface disconnected",
            ));
        }
        Ok(())
    }
}

impl RenderSurface for ScriptedSurface {
    fn set_viewport(&mut self, width: u32, height: u32) -> Result<()> {
        self.ensure_connected()?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn inject(&mut self, choreography: &Choreography) -> Result<()> {
        self.ensure_connected()?;
        self.choreography = Some(choreography.clone());
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        if self
            .disconnect_after
            .is_some_and(|limit| self.seeks.len() >= limit)
        {
            self.disconnected = true;
        }
        self.ensure_connected()?;
        self.time = seconds;
        self.seeks.push(seconds);
        Ok(())
    }

    fn active_contexts(&mut self) -> Result<usize> {
        self.ensure_connected()?;
        if let Some(count) = self.schedule.pop_front() {
            return Ok(count);
        }
        if self.gap_remaining > 0 {
            self.gap_remaining -= 1;
            return Ok(0);
        }
        Ok(self.settled_contexts)
    }

    fn capture_viewport(&mut self) -> Result<FrameImage> {
        self.ensure_connected()?;
        Ok(self.frame_at(self.time, self.system))
    }

    fn switch_system(&mut self, system: VisualSystem) -> Result<()> {
        self.ensure_connected()?;
        self.system = system;
        self.switches.push(system);
        self.gap_remaining = self.switch_gap;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_clock_draws_same_pixels() {
        let mut surface = ScriptedSurface::new(3, 2);
        surface.seek(1.5).unwrap();
        let a = surface.capture_viewport().unwrap();
        surface.seek(0.2).unwrap();
        surface.seek(1.5).unwrap();
        let b = surface.capture_viewport().unwrap();
        assert_eq!(a, b);
        assert_eq!((a.width(), a.height()), (3, 2));
    }

    #[test]
    fn switch_gap_reports_zero_contexts() {
        let mut surface = ScriptedSurface::new(2, 2).with_switch_gap(2);
        assert_eq!(surface.active_contexts().unwrap(), 1);
        surface.switch_system(VisualSystem::Quantum).unwrap();
        assert_eq!(surface.active_contexts().unwrap(), 0);
        assert_eq!(surface.active_contexts().unwrap(), 0);
        assert_eq!(surface.active_contexts().unwrap(), 1);
        assert_eq!(surface.system(), VisualSystem::Quantum);
    }

    #[test]
    fn disconnects_after_budget() {
        let mut surface = ScriptedSurface::new(2, 2).with_disconnect_after(1);
        surface.seek(0.0).unwrap();
        let err = surface.seek(0.1).unwrap_err();
        assert!(matches!(err, RenderError::SurfaceUnavailable(_)));
    }
}
