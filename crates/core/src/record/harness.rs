use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::capture::FrameSink;
use crate::config::LiveConfig;
use crate::record::studio::lock;
use crate::record::{spawn_ticker, LiveSession, LiveStats, Studio};
use crate::surface::{RenderSurface, VisualSystem};
use crate::Result;

/// Switch order exercised while recording.
pub const DEFAULT_SWITCH_SCHEDULE: [VisualSystem; 4] = [
    VisualSystem::Quantum,
    VisualSystem::Holographic,
    VisualSystem::Faceted,
    VisualSystem::Quantum,
];

/// More skipped ticks than this means capture was effectively broken.
const MAX_SKIPPED_TICKS: u64 = 10;

/// Summary of a recording exercised across system switches.
#[derive(Debug, Clone, Serialize)]
pub struct LiveAssessment {
    pub stats: LiveStats,
    pub expected_switches: u64,
    /// Fewer captured frames than this fails the take.
    pub min_frames: u64,
    /// Recording was still on after every switch.
    pub survived_switches: bool,
    /// The final stop succeeded and left the session idle.
    pub stopped_cleanly: bool,
}

impl LiveAssessment {
    pub fn captured_frames(&self) -> bool {
        self.stats.frames > 0 && self.stats.frames >= self.min_frames
    }

    pub fn switches_completed(&self) -> bool {
        self.stats.switches >= self.expected_switches
    }

    /// Zero-context ticks were covered by the buffer rather than dropped.
    pub fn buffer_engaged(&self) -> bool {
        self.stats.zero_context_ticks == 0 || self.stats.buffered > 0
    }

    pub fn passed(&self) -> bool {
        self.captured_frames()
            && self.switches_completed()
            && self.buffer_engaged()
            && self.survived_switches
            && self.stopped_cleanly
            && self.stats.skipped <= MAX_SKIPPED_TICKS
    }
}

/// Records from a live surface while firing scheduled system switches.
#[derive(Debug, Clone)]
pub struct LiveHarness {
    config: LiveConfig,
    schedule: Vec<VisualSystem>,
}

impl LiveHarness {
    pub fn new(config: LiveConfig) -> Self {
        Self {
            config,
            schedule: DEFAULT_SWITCH_SCHEDULE.to_vec(),
        }
    }

    pub fn with_schedule(mut self, schedule: Vec<VisualSystem>) -> Self {
        self.schedule = schedule;
        self
    }

    /// Runs one take: start, switch on schedule, stop.
    pub fn run<S>(&self, surface: S, sink: Box<dyn FrameSink + Send>) -> Result<LiveAssessment>
    where
        S: RenderSurface + Send + 'static,
    {
        let session = LiveSession::new(sink, self.config.max_transition_ticks);
        let studio = Arc::new(Mutex::new(Studio::new(surface, session)));
        lock(&studio)?.start_recording()?;

        let ticker = spawn_ticker(studio.clone(), self.config.tick_interval());
        let switched = self.fire_switches(&studio, self.config.switch_interval());
        let ticked = ticker.stop();
        let survived_switches = switched?;
        ticked?;

        let mut studio = lock(&studio)?;
        let stats = studio.stop_recording()?;
        let stopped_cleanly = !studio.is_recording();

        Ok(LiveAssessment {
            stats,
            expected_switches: self.schedule.len() as u64,
            min_frames: self.config.min_frames,
            survived_switches,
            stopped_cleanly,
        })
    }

    fn fire_switches<S: RenderSurface>(
        &self,
        studio: &Mutex<Studio<S>>,
        interval: Duration,
    ) -> Result<bool> {
        let mut survived = true;
        for system in &self.schedule {
            std::thread::sleep(interval);
            let mut studio = lock(studio)?;
            studio.switch_system(*system)?;
            survived &= studio.is_recording();
        }
        std::thread::sleep(interval);
        Ok(survived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MemorySink, StagingStore};
    use crate::surface::ScriptedSurface;

    fn quick_config() -> LiveConfig {
        LiveConfig {
            tick_hz: 500,
            switch_interval_ms: 20,
            max_transition_ticks: 30,
            min_frames: 1,
            ..Default::default()
        }
    }

    #[test]
    fn recording_survives_scheduled_switches() {
        let surface = ScriptedSurface::new(4, 4).with_switch_gap(2);
        let assessment = LiveHarness::new(quick_config())
            .run(surface, Box::new(MemorySink::default()))
            .unwrap();

        assert!(assessment.survived_switches);
        assert!(assessment.stopped_cleanly);
        assert_eq!(assessment.stats.switches, 4);
        assert!(assessment.captured_frames());
        assert!(assessment.buffer_engaged());
        assert!(assessment.passed());
    }

    #[test]
    fn live_frames_can_be_staged_to_disk() {
        let root = tempfile::tempdir().unwrap();
        let store = StagingStore::recreate(root.path().join("live")).unwrap();
        let assessment = LiveHarness::new(quick_config())
            .with_schedule(vec![VisualSystem::Holographic])
            .run(ScriptedSurface::new(2, 2), Box::new(store))
            .unwrap();

        let staged = std::fs::read_dir(root.path().join("live")).unwrap().count() as u64;
        assert_eq!(staged, assessment.stats.frames);
        assert!(assessment.passed());
    }

    fn assessment(stats: LiveStats) -> LiveAssessment {
        LiveAssessment {
            stats,
            expected_switches: 4,
            min_frames: 100,
            survived_switches: true,
            stopped_cleanly: true,
        }
    }

    #[test]
    fn too_many_skipped_ticks_fail_the_assessment() {
        let assessment = assessment(LiveStats {
            frames: 500,
            skipped: 11,
            switches: 4,
            ..Default::default()
        });
        assert!(!assessment.passed());
    }

    #[test]
    fn zero_context_ticks_without_buffering_fail_the_assessment() {
        let assessment = assessment(LiveStats {
            frames: 500,
            zero_context_ticks: 6,
            buffered: 0,
            switches: 4,
            ..Default::default()
        });
        assert!(!assessment.buffer_engaged());
        assert!(!assessment.passed());

        let covered = self::assessment(LiveStats {
            buffered: 6,
            ..assessment.stats
        });
        assert!(covered.passed());
    }

    #[test]
    fn too_few_frames_fail_the_assessment() {
        let short = assessment(LiveStats {
            frames: 100,
            switches: 4,
            ..Default::default()
        });
        assert!(short.passed());

        let shorter = assessment(LiveStats {
            frames: 99,
            ..short.stats
        });
        assert!(!shorter.captured_frames());
        assert!(!shorter.passed());
    }
}
