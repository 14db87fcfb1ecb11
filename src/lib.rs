//! Zonewatch: zone-aware surveillance event engine.
//!
//! Detections flow in from a detector, get reduced to centroids, and are
//! classified against named polygon zones. The engine decides whether a
//! frame is an event (restricted-zone breach or crowd overload), gates the
//! expensive side effects behind per-category cooldowns, and leaves CSV
//! logs and JPEG evidence behind.
//!
//! # Module Structure
//!
//! - `zone`: polygons, containment, per-zone tallies
//! - `heatmap`: cumulative detection density
//! - `alert`: cooldown-based alert policy
//! - `event_log`: append-only CSV logs
//! - `engine`: monitors and the frame cycle
//! - `frame`, `ingest`, `detect`, `evidence`: collaborators at the edges
//! - `config`: file + environment configuration

use std::path::PathBuf;

use anyhow::Result;

pub mod alert;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod evidence;
pub mod frame;
pub mod heatmap;
pub mod ingest;
pub mod zone;

pub use alert::{AlertCategory, AlertPolicy, Cooldown, SharedAlertPolicy};
pub use config::EngineConfig;
pub use detect::{BoundingBox, Detection, Detector, DetectorSettings, DeviceHint};
pub use engine::{
    Action, CrowdMonitor, Effects, FrameCycle, FrameOutcome, IntrusionMonitor, Monitor, RunState,
    RunSummary, StopReason, StopSignal,
};
pub use error::EngineError;
pub use event_log::{CountRecord, CsvEventLog, EventRecord, EventSink, HeaderPolicy};
pub use evidence::{Alarm, AlarmTone, JpegSnapshotWriter, SnapshotWriter};
pub use frame::{Frame, FrameContext};
pub use heatmap::{DensityAccumulator, DensityField};
pub use ingest::{FrameSource, SourceConfig};
pub use zone::{classify, Point, Zone, ZoneCounts, ZoneSet};

/// Which monitor a run drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Intrusion,
    Crowd,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Intrusion => "intrusion",
            Mode::Crowd => "crowd",
        }
    }
}

/// Monitor for `mode` writing CSV logs at the configured paths.
pub fn build_monitor(cfg: &EngineConfig, mode: Mode) -> Result<Box<dyn Monitor>> {
    let csv = |path: &PathBuf| -> Box<dyn EventSink> {
        Box::new(CsvEventLog::new(path.clone(), cfg.header_policy))
    };
    let monitor: Box<dyn Monitor> = match mode {
        Mode::Intrusion => Box::new(IntrusionMonitor::new(
            cfg.intrusion.zone.clone(),
            cfg.intrusion.settings.clone(),
            csv(&cfg.intrusion.log_path),
        )?),
        Mode::Crowd => Box::new(CrowdMonitor::new(
            cfg.crowd.zones.clone(),
            cfg.crowd.settings.clone(),
            csv(&cfg.crowd.event_log_path),
            csv(&cfg.crowd.count_log_path),
        )?),
    };
    Ok(monitor)
}

/// JPEG snapshots plus the terminal bell, or a silent alarm when disabled.
pub fn build_effects(alarm_enabled: bool) -> Effects {
    let alarm: Box<dyn Alarm> = if alarm_enabled {
        Box::new(evidence::TerminalBell)
    } else {
        Box::new(evidence::SilentAlarm)
    };
    Effects::new(Box::new(JpegSnapshotWriter::new()), alarm)
}
