use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::capture::CancelToken;
use crate::record::{LiveSession, LiveStats, RecordingState, TickOutcome};
use crate::surface::{RenderSurface, VisualSystem};
use crate::{RenderError, Result};

/// A live render surface paired with its recording session.
#[derive(Debug)]
pub struct Studio<S> {
    surface: S,
    session: LiveSession,
}

impl<S: RenderSurface> Studio<S> {
    pub fn new(surface: S, session: LiveSession) -> Self {
        Self { surface, session }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn session(&self) -> &LiveSession {
        &self.session
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_recording()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.session.state()
    }

    pub fn start_recording(&mut self) -> Result<()> {
        self.session.start()
    }

    pub fn stop_recording(&mut self) -> Result<LiveStats> {
        self.session.stop()
    }

    /// Hot-swaps the visual system. The recording state is left exactly as
    /// it was.
    pub fn switch_system(&mut self, system: VisualSystem) -> Result<()> {
        self.surface.switch_system(system)?;
        self.session.note_switch();
        tracing::info!(%system, recording = self.session.is_recording(), "system switch complete");
        Ok(())
    }

    /// Captures one video-frame tick when recording.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if !self.session.is_recording() {
            return Ok(TickOutcome::Idle);
        }
        let capture = self.surface.capture()?;
        self.session.tick(&capture)
    }
}

pub(crate) fn lock<S>(studio: &Mutex<Studio<S>>) -> Result<MutexGuard<'_, Studio<S>>> {
    studio
        .lock()
        .map_err(|_| RenderError::msg("studio has been poisoned"))
}

/// Handle to the periodic tick task.
#[derive(Debug)]
pub struct TickerHandle {
    stop: CancelToken,
    handle: Option<JoinHandle<Result<u64>>>,
}

impl TickerHandle {
    /// Stops the task, waits for it and returns how many ticks ran. A tick
    /// error that ended the task early is returned here.
    pub fn stop(mut self) -> Result<u64> {
        self.stop.cancel();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| RenderError::msg("ticker thread panicked"))?,
            None => Ok(0),
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Spawns the single periodic task that ticks `studio` every `interval`.
pub fn spawn_ticker<S>(studio: Arc<Mutex<Studio<S>>>, interval: Duration) -> TickerHandle
where
    S: RenderSurface + Send + 'static,
{
    let stop = CancelToken::new();
    let flag = stop.clone();
    let handle = std::thread::spawn(move || -> Result<u64> {
        let mut ticks = 0;
        while !flag.is_cancelled() {
            let started = Instant::now();
            lock(&studio)?.tick()?;
            ticks += 1;
            std::thread::sleep(interval.saturating_sub(started.elapsed()));
        }
        Ok(ticks)
    });

    TickerHandle {
        stop,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MemorySink;
    use crate::continuity::CaptureOutcome;
    use crate::surface::ScriptedSurface;

    fn studio(surface: ScriptedSurface) -> Studio<ScriptedSurface> {
        Studio::new(surface, LiveSession::new(Box::new(MemorySink::default()), 30))
    }

    #[test]
    fn switching_systems_keeps_recording() {
        let mut studio = studio(ScriptedSurface::new(4, 4).with_switch_gap(3));
        studio.start_recording().unwrap();
        studio.tick().unwrap();

        studio.switch_system(VisualSystem::Quantum).unwrap();
        assert_eq!(studio.recording_state(), RecordingState::Recording);
        for _ in 0..3 {
            assert_eq!(
                studio.tick().unwrap(),
                TickOutcome::Captured(CaptureOutcome::Buffered)
            );
        }
        assert_eq!(
            studio.tick().unwrap(),
            TickOutcome::Captured(CaptureOutcome::Direct)
        );

        studio.switch_system(VisualSystem::Holographic).unwrap();
        assert!(studio.is_recording());

        let stats = studio.stop_recording().unwrap();
        assert_eq!(stats.switches, 2);
        assert_eq!(stats.buffered, 3);
        assert_eq!(stats.skipped, 0);
    }

    #[test]
    fn switching_while_idle_does_not_start_recording() {
        let mut studio = studio(ScriptedSurface::new(4, 4));
        studio.switch_system(VisualSystem::Quantum).unwrap();
        assert_eq!(studio.recording_state(), RecordingState::Idle);
        assert_eq!(studio.tick().unwrap(), TickOutcome::Idle);
        assert!(studio.surface().seeks().is_empty());
    }

    #[test]
    fn start_twice_reports_already_recording() {
        let mut studio = studio(ScriptedSurface::new(4, 4));
        studio.start_recording().unwrap();
        assert!(matches!(
            studio.start_recording().unwrap_err(),
            RenderError::AlreadyRecording
        ));
        assert!(studio.is_recording());
    }

    #[test]
    fn ticker_runs_until_stopped() {
        let shared = Arc::new(Mutex::new(studio(ScriptedSurface::new(2, 2))));
        lock(&shared).unwrap().start_recording().unwrap();

        let ticker = spawn_ticker(shared.clone(), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(30));
        lock(&shared)
            .unwrap()
            .switch_system(VisualSystem::Quantum)
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let ticks = ticker.stop().unwrap();

        let mut studio = lock(&shared).unwrap();
        assert!(studio.is_recording());
        let stats = studio.stop_recording().unwrap();
        assert!(ticks > 0);
        assert_eq!(stats.ticks, ticks);
        assert_eq!(stats.switches, 1);
    }

    #[test]
    fn ticker_surfaces_tick_errors() {
        let mut surface = ScriptedSurface::new(2, 2).with_disconnect_after(0);
        let _ = surface.seek(0.0);
        let shared = Arc::new(Mutex::new(studio(surface)));
        lock(&shared).unwrap().start_recording().unwrap();

        let ticker = spawn_ticker(shared, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        let err = ticker.stop().unwrap_err();
        assert!(matches!(err, RenderError::SurfaceUnavailable(_)));
    }
}
