//! Frame cycle orchestration.
//!
//! `FrameCycle` pulls frames from a source, runs the detector, keeps the
//! target-class centroids and hands them to a `Monitor`. The monitor owns
//! the mode-specific decision logic (intrusion or crowd) and its gated side
//! effects. One frame is fully processed before the next is requested.
//!
//! State machine: `Running` until end of stream, a stop signal, the frame
//! limit, or a capture failure; then `Stopped` for good.

mod crowd;
mod intrusion;
mod monitor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::detect::{Detector, PERSON_CLASS};
use crate::ingest::FrameSource;

pub use crowd::{assess_crowd, CrowdAssessment, CrowdMonitor, CrowdSettings, OVERLOAD_EVENT};
pub use intrusion::{assess_intrusion, IntrusionAssessment, IntrusionMonitor, IntrusionSettings};
pub use monitor::{target_centroids, Action, Effects, FrameOutcome, Monitor};

/// Cooperative stop flag, checked once per iteration.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    StopSignal,
    MaxFrames,
    /// Capture failed mid-stream. Terminal, never retried.
    SourceFailed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped(StopReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub reason: StopReason,
    pub actions: usize,
    pub failures: usize,
    pub detector_failures: u64,
}

pub struct FrameCycle {
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    monitor: Box<dyn Monitor>,
    effects: Effects,
    stop: StopSignal,
    target_class: u32,
    max_frames: Option<u64>,
    health_interval: Option<Duration>,
    state: RunState,
    frames: u64,
    last_people: usize,
}

impl FrameCycle {
    /// Prepare the monitor's logs. Fails on fatal log errors (schema mismatch).
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        mut monitor: Box<dyn Monitor>,
        effects: Effects,
    ) -> Result<Self> {
        monitor.prepare()?;
        Ok(Self {
            source,
            detector,
            monitor,
            effects,
            stop: StopSignal::new(),
            target_class: PERSON_CLASS,
            max_frames: None,
            health_interval: None,
            state: RunState::Running,
            frames: 0,
            last_people: 0,
        })
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_target_class(mut self, class_id: u32) -> Self {
        self.target_class = class_id;
        self
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Emit a health line at most this often during `run`.
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = Some(interval);
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    fn halt(&mut self, reason: StopReason) {
        match &reason {
            StopReason::SourceFailed(msg) => log::error!("stopping {}: {}", self.monitor.mode(), msg),
            other => log::info!("stopping {}: {:?}", self.monitor.mode(), other),
        }
        self.source.release();
        self.state = RunState::Stopped(reason);
    }

    /// Process one frame. `None` once the cycle has stopped.
    pub fn step(&mut self) -> Option<FrameOutcome> {
        if matches!(self.state, RunState::Stopped(_)) {
            return None;
        }
        if self.stop.is_triggered() {
            self.halt(StopReason::StopSignal);
            return None;
        }
        if self.max_frames.is_some_and(|max| self.frames >= max) {
            self.halt(StopReason::MaxFrames);
            return None;
        }

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.halt(StopReason::EndOfStream);
                return None;
            }
            Err(err) => {
                self.halt(StopReason::SourceFailed(format!("{:#}", err)));
                return None;
            }
        };
        self.frames += 1;
        let mut outcome = FrameOutcome::new(self.frames);

        let detections = match self.detector.infer(&frame) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!(
                    "frame {}: detector {} failed, treating as empty: {:#}",
                    self.frames,
                    self.detector.name(),
                    err
                );
                outcome.detector_failed = true;
                Vec::new()
            }
        };
        let centroids = target_centroids(&detections, self.target_class);
        self.monitor
            .process(&frame, &centroids, &mut self.effects, &mut outcome);
        self.last_people = outcome.people;
        Some(outcome)
    }

    /// Run until stopped, passing every outcome to `on_frame`.
    pub fn run<F: FnMut(&FrameOutcome)>(&mut self, mut on_frame: F) -> RunSummary {
        let mut actions = 0;
        let mut failures = 0;
        let mut detector_failures = 0;
        let mut last_health = Instant::now();
        while let Some(outcome) = self.step() {
            actions += outcome.actions.len();
            failures += outcome.failures.len();
            detector_failures += u64::from(outcome.detector_failed);
            on_frame(&outcome);

            if let Some(interval) = self.health_interval {
                if last_health.elapsed() >= interval {
                    log::info!(
                        "health: mode={} frames={} source_healthy={} people={}",
                        self.monitor.mode(),
                        self.frames,
                        self.source.is_healthy(),
                        self.last_people
                    );
                    last_health = Instant::now();
                }
            }
        }
        let reason = match &self.state {
            RunState::Stopped(reason) => reason.clone(),
            RunState::Running => StopReason::EndOfStream,
        };
        RunSummary {
            frames: self.frames,
            reason,
            actions,
            failures,
            detector_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, DetectorSettings, MarkerDetector};
    use crate::event_log::MemoryEventLog;
    use crate::evidence::{MemorySnapshotWriter, SilentAlarm};
    use crate::frame::Frame;
    use crate::ingest::{open_source, SourceConfig};
    use crate::zone::Zone;

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Err(anyhow::anyhow!("inference exploded"))
        }
    }

    fn monitor() -> Box<dyn Monitor> {
        let zone = Zone::new(
            "everything",
            vec![(0, 0).into(), (640, 0).into(), (640, 480).into(), (0, 480).into()],
        )
        .unwrap();
        Box::new(
            IntrusionMonitor::new(
                zone,
                IntrusionSettings::default(),
                Box::new(MemoryEventLog::new("intrusion")),
            )
            .unwrap(),
        )
    }

    fn effects() -> Effects {
        Effects::new(Box::new(MemorySnapshotWriter::new()), Box::new(SilentAlarm))
    }

    fn stub(url: &str) -> Box<dyn FrameSource> {
        open_source(&SourceConfig {
            url: url.to_string(),
            ..SourceConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn end_of_stream_stops_the_cycle_for_good() -> Result<()> {
        let detector = Box::new(MarkerDetector::new(DetectorSettings::default()));
        let mut cycle = FrameCycle::new(stub("stub://t?people=1&frames=2"), detector, monitor(), effects())?;
        assert!(cycle.step().is_some());
        assert!(cycle.step().is_some());
        assert!(cycle.step().is_none());
        assert_eq!(cycle.state(), &RunState::Stopped(StopReason::EndOfStream));
        assert!(cycle.step().is_none());
        assert_eq!(cycle.frames_processed(), 2);
        Ok(())
    }

    #[test]
    fn stop_signal_is_honoured_between_frames() -> Result<()> {
        let detector = Box::new(MarkerDetector::new(DetectorSettings::default()));
        let mut cycle = FrameCycle::new(stub("stub://t?people=1"), detector, monitor(), effects())?;
        let stop = cycle.stop_signal();
        let summary = cycle.run(|outcome| {
            if outcome.frame_index == 3 {
                stop.trigger();
            }
        });
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.reason, StopReason::StopSignal);
        Ok(())
    }

    #[test]
    fn detector_failures_skip_the_frame_and_continue() -> Result<()> {
        let mut cycle = FrameCycle::new(
            stub("stub://t?people=3&frames=4"),
            Box::new(FailingDetector),
            monitor(),
            effects(),
        )?;
        let summary = cycle.run(|outcome| {
            assert!(outcome.detector_failed);
            assert_eq!(outcome.people, 0);
            assert!(!outcome.triggered);
        });
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.detector_failures, 4);
        assert_eq!(summary.reason, StopReason::EndOfStream);
        Ok(())
    }

    #[test]
    fn max_frames_bounds_an_endless_source() -> Result<()> {
        let detector = Box::new(MarkerDetector::new(DetectorSettings::default()));
        let mut cycle = FrameCycle::new(stub("stub://t?people=1"), detector, monitor(), effects())?
            .with_max_frames(Some(5));
        let summary = cycle.run(|_| {});
        assert_eq!(summary.frames, 5);
        assert_eq!(summary.reason, StopReason::MaxFrames);
        // first breach fires, later ones fall inside the cooldown
        assert_eq!(summary.actions, 3);
        Ok(())
    }
}
