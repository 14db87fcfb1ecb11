use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::alert::{AlertCategory, AlertPolicy};
use crate::engine::monitor::{tolerate_init, Action, Effects, FrameOutcome, Monitor};
use crate::event_log::{append_record, CountRecord, EventRecord, EventSink, LogRecord};
use crate::evidence::{snapshot_name, AlarmTone};
use crate::frame::Frame;
use crate::heatmap::DensityAccumulator;
use crate::zone::{Point, ZoneCounts, ZoneSet};

/// Label of crowd alert rows in the event log.
pub const OVERLOAD_EVENT: &str = "Crowd Overload";

#[derive(Clone, Debug, PartialEq)]
pub struct CrowdSettings {
    /// Largest tolerated head count; more than this is an overload.
    pub max_capacity: usize,
    pub snapshot_dir: PathBuf,
    pub snapshot_interval: Duration,
    pub count_log_interval: Duration,
    pub heatmap_alpha: f32,
    pub tone: AlarmTone,
}

impl Default for CrowdSettings {
    fn default() -> Self {
        Self {
            max_capacity: 20,
            snapshot_dir: PathBuf::from("person_detection/crowd_snapshots"),
            snapshot_interval: Duration::from_secs(30),
            count_log_interval: Duration::from_secs(60),
            heatmap_alpha: 0.6,
            tone: AlarmTone::new(1200, 600),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrowdAssessment {
    pub people: usize,
    pub zone_counts: ZoneCounts,
    pub overloaded: bool,
}

pub fn assess_crowd(zones: &ZoneSet, centroids: &[Point], max_capacity: usize) -> CrowdAssessment {
    CrowdAssessment {
        people: centroids.len(),
        zone_counts: zones.tally(centroids),
        overloaded: centroids.len() > max_capacity,
    }
}

/// Crowd watch: per-zone occupancy, cumulative heatmap, capacity alerts,
/// and a periodic head-count log.
///
/// Capacity alerts and count logging run on independent cooldowns.
pub struct CrowdMonitor {
    zones: ZoneSet,
    settings: CrowdSettings,
    heatmap: DensityAccumulator,
    policy: AlertPolicy,
    event_log: Box<dyn EventSink>,
    count_log: Box<dyn EventSink>,
}

impl CrowdMonitor {
    pub fn new(
        zones: ZoneSet,
        settings: CrowdSettings,
        event_log: Box<dyn EventSink>,
        count_log: Box<dyn EventSink>,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&settings.heatmap_alpha) {
            return Err(anyhow!(
                "heatmap alpha must be within 0..=1, got {}",
                settings.heatmap_alpha
            ));
        }
        let policy = AlertPolicy::new()
            .with_interval(AlertCategory::CrowdCapture, settings.snapshot_interval)?
            .with_interval(AlertCategory::CrowdCountLog, settings.count_log_interval)?;
        Ok(Self {
            zones,
            settings,
            heatmap: DensityAccumulator::new(),
            policy,
            event_log,
            count_log,
        })
    }

    pub fn heatmap(&self) -> &DensityAccumulator {
        &self.heatmap
    }

    pub fn zones(&self) -> &ZoneSet {
        &self.zones
    }

    /// Frame blended with the heatmap; the raw frame if no field fits it.
    fn snapshot_image(&self, frame: &Frame) -> Result<RgbImage> {
        let image = frame.to_rgb_image()?;
        match self.heatmap.field() {
            Some(field) if field.width() == frame.width && field.height() == frame.height => {
                field.overlay(&image, self.settings.heatmap_alpha)
            }
            _ => Ok(image),
        }
    }

    fn capture(&mut self, frame: &Frame, effects: &mut Effects, outcome: &mut FrameOutcome) {
        let name = snapshot_name("crowd", frame.wall_clock());
        let path = self.settings.snapshot_dir.join(&name);
        outcome.record(
            self.snapshot_image(frame)
                .and_then(|image| effects.snapshots.write_image(&path, &image))
                .map(|_| Action::Snapshot(path.clone())),
        );

        effects.alarm.sound(self.settings.tone);
        outcome.record(Ok(Action::Alarm(self.settings.tone)));

        let record = EventRecord::new(frame.wall_clock(), OVERLOAD_EVENT, &name);
        let appended = self
            .event_log
            .ensure_initialized(EventRecord::HEADER)
            .and_then(|_| append_record(self.event_log.as_mut(), &record))
            .map(|_| Action::EventRow {
                location: self.event_log.location(),
                event: record.event.clone(),
            });
        outcome.record(appended);
    }

    fn log_count(&mut self, frame: &Frame, people: usize, outcome: &mut FrameOutcome) {
        let count = u32::try_from(people).unwrap_or(u32::MAX);
        let record = CountRecord::new(frame.wall_clock(), count);
        let appended = self
            .count_log
            .ensure_initialized(CountRecord::HEADER)
            .and_then(|_| append_record(self.count_log.as_mut(), &record))
            .map(|_| Action::CountRow {
                location: self.count_log.location(),
                count,
            });
        outcome.record(appended);
    }
}

impl Monitor for CrowdMonitor {
    fn mode(&self) -> &'static str {
        "crowd"
    }

    fn prepare(&mut self) -> Result<()> {
        let events = self.event_log.location();
        tolerate_init(self.event_log.ensure_initialized(EventRecord::HEADER), &events)?;
        let counts = self.count_log.location();
        tolerate_init(self.count_log.ensure_initialized(CountRecord::HEADER), &counts)
    }

    fn process(
        &mut self,
        frame: &Frame,
        centroids: &[Point],
        effects: &mut Effects,
        outcome: &mut FrameOutcome,
    ) {
        if let Err(err) = self.heatmap.observe(frame.width, frame.height, centroids) {
            log::warn!("frame {}: heatmap not updated: {:#}", outcome.frame_index, err);
            outcome.failures.push(err);
        }

        let assessment = assess_crowd(&self.zones, centroids, self.settings.max_capacity);
        log::debug!(
            "frame {}: {} people ({})",
            outcome.frame_index,
            assessment.people,
            assessment.zone_counts.summary()
        );
        outcome.people = assessment.people;
        outcome.triggered = assessment.overloaded;
        outcome.zone_counts = assessment.zone_counts;

        let now = frame.captured_at();
        if assessment.overloaded && self.policy.should_fire(AlertCategory::CrowdCapture, now) {
            log::warn!(
                "crowd overload: {} people (capacity {})",
                assessment.people,
                self.settings.max_capacity
            );
            self.capture(frame, effects, outcome);
        }
        if self.policy.should_fire(AlertCategory::CrowdCountLog, now) {
            self.log_count(frame, assessment.people, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::Zone;

    fn halves() -> ZoneSet {
        ZoneSet::new(vec![
            Zone::new("Zone A", vec![(0, 0).into(), (640, 0).into(), (640, 240).into(), (0, 240).into()])
                .unwrap(),
            Zone::new(
                "Zone B",
                vec![(0, 240).into(), (640, 240).into(), (640, 480).into(), (0, 480).into()],
            )
            .unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn overload_is_strictly_above_capacity() {
        let zones = halves();
        let at_capacity: Vec<Point> = (0..20).map(|i| Point::new(i * 10, 100)).collect();
        assert!(!assess_crowd(&zones, &at_capacity, 20).overloaded);

        let over: Vec<Point> = (0..21).map(|i| Point::new(i * 10, 300)).collect();
        let assessment = assess_crowd(&zones, &over, 20);
        assert!(assessment.overloaded);
        assert_eq!(assessment.people, 21);
        assert_eq!(assessment.zone_counts.get("Zone B"), Some(21));
        assert_eq!(assessment.zone_counts.get("Zone A"), Some(0));
    }

    #[test]
    fn people_outside_every_zone_still_count() {
        let assessment = assess_crowd(&halves(), &[Point::new(900, 900)], 20);
        assert_eq!(assessment.people, 1);
        assert_eq!(assessment.zone_counts.summary(), "Zone A=0 Zone B=0");
    }
}
