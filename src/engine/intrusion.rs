use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::alert::{AlertCategory, AlertPolicy};
use crate::engine::monitor::{tolerate_init, Action, Effects, FrameOutcome, Monitor};
use crate::event_log::{append_record, EventRecord, EventSink, LogRecord};
use crate::evidence::{snapshot_name, AlarmTone};
use crate::frame::Frame;
use crate::zone::{Point, Zone};

#[derive(Clone, Debug, PartialEq)]
pub struct IntrusionSettings {
    pub capture_dir: PathBuf,
    pub capture_interval: Duration,
    pub event_label: String,
    pub tone: AlarmTone,
}

impl Default for IntrusionSettings {
    fn default() -> Self {
        Self {
            capture_dir: PathBuf::from("intrusion_detection/captures"),
            capture_interval: Duration::from_secs(30),
            event_label: "Restricted Area Breach".to_string(),
            tone: AlarmTone::new(1500, 700),
        }
    }
}

/// Breach decision for one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntrusionAssessment {
    pub breached: bool,
    /// Centroids inside the restricted zone.
    pub inside: Vec<Point>,
}

pub fn assess_intrusion(zone: &Zone, centroids: &[Point]) -> IntrusionAssessment {
    let inside: Vec<Point> = centroids.iter().copied().filter(|p| zone.contains(*p)).collect();
    IntrusionAssessment {
        breached: !inside.is_empty(),
        inside,
    }
}

/// Restricted-zone watch: any target inside the zone is a breach.
///
/// A breach outside the cooldown captures the raw frame, sounds the alarm
/// and appends one row to the intrusion log.
pub struct IntrusionMonitor {
    zone: Zone,
    settings: IntrusionSettings,
    policy: AlertPolicy,
    log: Box<dyn EventSink>,
}

impl IntrusionMonitor {
    pub fn new(zone: Zone, settings: IntrusionSettings, log: Box<dyn EventSink>) -> Result<Self> {
        let policy = AlertPolicy::new()
            .with_interval(AlertCategory::IntrusionCapture, settings.capture_interval)?;
        Ok(Self {
            zone,
            settings,
            policy,
            log,
        })
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    fn capture(&mut self, frame: &Frame, effects: &mut Effects, outcome: &mut FrameOutcome) {
        let name = snapshot_name("intrusion", frame.wall_clock());
        let path = self.settings.capture_dir.join(&name);
        outcome.record(
            frame
                .to_rgb_image()
                .and_then(|image| effects.snapshots.write_image(&path, &image))
                .map(|_| Action::Snapshot(path.clone())),
        );

        effects.alarm.sound(self.settings.tone);
        outcome.record(Ok(Action::Alarm(self.settings.tone)));

        let record = EventRecord::new(frame.wall_clock(), &self.settings.event_label, &name);
        let appended = self
            .log
            .ensure_initialized(EventRecord::HEADER)
            .and_then(|_| append_record(self.log.as_mut(), &record))
            .map(|_| Action::EventRow {
                location: self.log.location(),
                event: record.event.clone(),
            });
        outcome.record(appended);
    }
}

impl Monitor for IntrusionMonitor {
    fn mode(&self) -> &'static str {
        "intrusion"
    }

    fn prepare(&mut self) -> Result<()> {
        let location = self.log.location();
        tolerate_init(self.log.ensure_initialized(EventRecord::HEADER), &location)
    }

    fn process(
        &mut self,
        frame: &Frame,
        centroids: &[Point],
        effects: &mut Effects,
        outcome: &mut FrameOutcome,
    ) {
        let assessment = assess_intrusion(&self.zone, centroids);
        outcome.people = centroids.len();
        outcome.triggered = assessment.breached;
        if !assessment.breached {
            return;
        }
        log::debug!(
            "frame {}: {} of {} inside {}",
            outcome.frame_index,
            assessment.inside.len(),
            centroids.len(),
            self.zone.name()
        );
        if self
            .policy
            .should_fire(AlertCategory::IntrusionCapture, frame.captured_at())
        {
            log::warn!("restricted area breach in {}", self.zone.name());
            self.capture(frame, effects, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Zone {
        Zone::new(
            "restricted",
            vec![(0, 0).into(), (10, 0).into(), (10, 10).into(), (0, 10).into()],
        )
        .unwrap()
    }

    #[test]
    fn breach_needs_one_centroid_inside() {
        let zone = square();
        let none = assess_intrusion(&zone, &[Point::new(15, 5), Point::new(-3, 2)]);
        assert!(!none.breached);

        let edge = assess_intrusion(&zone, &[Point::new(15, 5), Point::new(10, 5)]);
        assert!(edge.breached);
        assert_eq!(edge.inside, vec![Point::new(10, 5)]);
    }

    #[test]
    fn empty_frame_is_not_a_breach() {
        assert_eq!(assess_intrusion(&square(), &[]), IntrusionAssessment::default());
    }
}
