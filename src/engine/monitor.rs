use std::path::PathBuf;

use anyhow::Result;

use crate::detect::Detection;
use crate::error::EngineError;
use crate::evidence::{Alarm, AlarmTone, SnapshotWriter};
use crate::frame::Frame;
use crate::zone::{Point, ZoneCounts};

/// Side-effect collaborators shared by every monitor.
pub struct Effects {
    pub snapshots: Box<dyn SnapshotWriter>,
    pub alarm: Box<dyn Alarm>,
}

impl Effects {
    pub fn new(snapshots: Box<dyn SnapshotWriter>, alarm: Box<dyn Alarm>) -> Self {
        Self { snapshots, alarm }
    }
}

/// A side effect that actually happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Snapshot(PathBuf),
    Alarm(AlarmTone),
    /// Alert row appended to the log at `location`.
    EventRow { location: String, event: String },
    /// Count row appended to the log at `location`.
    CountRow { location: String, count: u32 },
}

/// What the engine decided and did for one frame.
#[derive(Debug, Default)]
pub struct FrameOutcome {
    /// 1-based position of the frame in the run.
    pub frame_index: u64,
    /// Detections of the target class.
    pub people: usize,
    /// Breach (intrusion) or overload (crowd), evaluated every frame.
    pub triggered: bool,
    /// Per-zone occupancy. Empty in intrusion mode.
    pub zone_counts: ZoneCounts,
    pub actions: Vec<Action>,
    /// Degraded side effects: failed writes, rejected heatmap updates.
    pub failures: Vec<anyhow::Error>,
    /// Inference failed and the frame was treated as empty.
    pub detector_failed: bool,
}

impl FrameOutcome {
    pub fn new(frame_index: u64) -> Self {
        Self {
            frame_index,
            ..Self::default()
        }
    }

    /// Stable codes of the recorded failures, `OTHER` for untyped ones.
    pub fn failure_codes(&self) -> Vec<&'static str> {
        self.failures
            .iter()
            .map(|e| e.downcast_ref::<EngineError>().map_or("OTHER", EngineError::code))
            .collect()
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &PathBuf> {
        self.actions.iter().filter_map(|a| match a {
            Action::Snapshot(path) => Some(path),
            _ => None,
        })
    }

    /// Record the result of a side effect.
    pub(crate) fn record(&mut self, result: Result<Action>) {
        match result {
            Ok(action) => {
                log::info!("{}", describe(&action));
                self.actions.push(action);
            }
            Err(err) => {
                log::error!("{:#}", err);
                self.failures.push(err);
            }
        }
    }
}

fn describe(action: &Action) -> String {
    match action {
        Action::Snapshot(path) => format!("snapshot saved: {}", path.display()),
        Action::Alarm(tone) => format!("alarm raised ({} Hz)", tone.frequency_hz),
        Action::EventRow { location, event } => format!("logged '{}' to {}", event, location),
        Action::CountRow { location, count } => format!("logged count {} to {}", count, location),
    }
}

/// Per-mode decision logic plus its gated side effects.
pub trait Monitor: Send {
    /// Mode name for log lines.
    fn mode(&self) -> &'static str;

    /// Create or validate the logs. Fatal errors abort before the loop.
    fn prepare(&mut self) -> Result<()>;

    /// Handle one frame's target-class centroids.
    fn process(
        &mut self,
        frame: &Frame,
        centroids: &[Point],
        effects: &mut Effects,
        outcome: &mut FrameOutcome,
    );
}

/// Centroids of detections of `target_class`. Other classes are dropped.
pub fn target_centroids(detections: &[Detection], target_class: u32) -> Vec<Point> {
    detections
        .iter()
        .filter(|d| d.class_id == target_class)
        .map(Detection::centroid)
        .collect()
}

/// Non-fatal initialisation errors are logged and retried on first append.
pub(crate) fn tolerate_init(result: Result<()>, what: &str) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<EngineError>() {
            Some(typed) if typed.is_fatal() => Err(err),
            _ => {
                log::warn!("{}: {:#}; will retry on first write", what, err);
                Ok(())
            }
        },
    }
}
