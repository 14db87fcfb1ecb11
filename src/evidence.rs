//! Evidence side effects: snapshot images and the audible alarm.
//!
//! Both sit behind narrow traits so the engine can run against recorders
//! in tests and against the real filesystem and terminal in `zonewatchd`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Timestamp pattern for snapshot names. Lexical order is time order.
pub const SNAPSHOT_TIMESTAMP: &str = "%Y-%m-%d_%H-%M-%S";

/// `<prefix>_<timestamp>.jpg`
pub fn snapshot_name(prefix: &str, at: DateTime<Local>) -> String {
    format!("{}_{}.jpg", prefix, at.format(SNAPSHOT_TIMESTAMP))
}

pub trait SnapshotWriter: Send {
    fn write_image(&mut self, path: &Path, image: &RgbImage) -> Result<()>;
}

/// Writes JPEG files, creating the target directory on demand.
#[derive(Clone, Debug)]
pub struct JpegSnapshotWriter {
    quality: u8,
}

impl JpegSnapshotWriter {
    pub fn new() -> Self {
        Self { quality: 90 }
    }
}

impl Default for JpegSnapshotWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotWriter for JpegSnapshotWriter {
    fn write_image(&mut self, path: &Path, image: &RgbImage) -> Result<()> {
        let failure = |reason: String| EngineError::SnapshotWriteFailure {
            path: path.to_path_buf(),
            reason,
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| failure(e.to_string()))?;
        }
        let file = std::fs::File::create(path).map_err(|e| failure(e.to_string()))?;
        let mut out = std::io::BufWriter::new(file);
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, self.quality);
        encoder
            .encode_image(image)
            .map_err(|e| failure(e.to_string()))?;
        out.flush().map_err(|e| failure(e.to_string()))?;
        Ok(())
    }
}

/// Keeps written images in memory. Clones share storage.
#[derive(Clone, Debug, Default)]
pub struct MemorySnapshotWriter {
    written: Arc<Mutex<Vec<(PathBuf, RgbImage)>>>,
    fail_writes: bool,
}

impl MemorySnapshotWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer whose every write fails with `SnapshotWriteFailure`.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.written
            .lock()
            .map(|w| w.iter().map(|(p, _)| p.clone()).collect())
            .unwrap_or_default()
    }

    pub fn images(&self) -> Vec<RgbImage> {
        self.written
            .lock()
            .map(|w| w.iter().map(|(_, img)| img.clone()).collect())
            .unwrap_or_default()
    }
}

impl SnapshotWriter for MemorySnapshotWriter {
    fn write_image(&mut self, path: &Path, image: &RgbImage) -> Result<()> {
        if self.fail_writes {
            return Err(EngineError::SnapshotWriteFailure {
                path: path.to_path_buf(),
                reason: "writes disabled".to_string(),
            }
            .into());
        }
        self.written
            .lock()
            .map_err(|_| anyhow!("snapshot recorder lock poisoned"))?
            .push((path.to_path_buf(), image.clone()));
        Ok(())
    }
}

/// Alarm tone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmTone {
    pub frequency_hz: u32,
    pub duration_ms: u64,
}

impl AlarmTone {
    pub const fn new(frequency_hz: u32, duration_ms: u64) -> Self {
        Self {
            frequency_hz,
            duration_ms,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Fire-and-forget alarm.
pub trait Alarm: Send {
    fn sound(&mut self, tone: AlarmTone);
}

/// Rings the terminal bell on stderr.
///
/// Terminals have no pitch control, so the tone is only logged.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl Alarm for TerminalBell {
    fn sound(&mut self, tone: AlarmTone) {
        log::info!(
            "alarm: {} Hz for {} ms",
            tone.frequency_hz,
            tone.duration_ms
        );
        let mut stderr = std::io::stderr();
        if let Err(err) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            log::debug!("alarm: terminal bell failed: {}", err);
        }
    }
}

#[derive(Debug, Default)]
pub struct SilentAlarm;

impl Alarm for SilentAlarm {
    fn sound(&mut self, tone: AlarmTone) {
        log::debug!("alarm suppressed: {} Hz", tone.frequency_hz);
    }
}

/// Records every tone. Clones share the record.
#[derive(Clone, Debug, Default)]
pub struct RecordingAlarm {
    tones: Arc<Mutex<Vec<AlarmTone>>>,
}

impl RecordingAlarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tones(&self) -> Vec<AlarmTone> {
        self.tones.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl Alarm for RecordingAlarm {
    fn sound(&mut self, tone: AlarmTone) {
        if let Ok(mut tones) = self.tones.lock() {
            tones.push(tone);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::Rgb;

    #[test]
    fn snapshot_names_sort_by_time() {
        let early = Local.with_ymd_and_hms(2024, 3, 9, 8, 5, 7).unwrap();
        let late = Local.with_ymd_and_hms(2024, 11, 2, 17, 0, 0).unwrap();
        let a = snapshot_name("intrusion", early);
        let b = snapshot_name("intrusion", late);
        assert_eq!(a, "intrusion_2024-03-09_08-05-07.jpg");
        assert!(a < b);
    }

    #[test]
    fn jpeg_writer_creates_directory_and_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("captures").join("crowd_test.jpg");
        let image = RgbImage::from_pixel(8, 6, Rgb([200, 30, 30]));
        JpegSnapshotWriter::new().write_image(&path, &image)?;

        let decoded = image::open(&path)?.to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 6));
        Ok(())
    }

    #[test]
    fn jpeg_writer_reports_snapshot_failure() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x")?;
        let err = JpegSnapshotWriter::new()
            .write_image(&blocker.join("a.jpg"), &RgbImage::new(2, 2))
            .unwrap_err();
        let typed = err.downcast_ref::<EngineError>().unwrap();
        assert_eq!(typed.code(), "SNAPSHOT_WRITE_FAILURE");
        Ok(())
    }

    #[test]
    fn recorders_share_state_across_clones() -> Result<()> {
        let alarm = RecordingAlarm::new();
        let mut handle = alarm.clone();
        handle.sound(AlarmTone::new(1500, 700));
        assert_eq!(alarm.tones(), vec![AlarmTone::new(1500, 700)]);
        assert_eq!(alarm.tones()[0].duration(), Duration::from_millis(700));

        let snaps = MemorySnapshotWriter::new();
        let mut writer = snaps.clone();
        writer.write_image(Path::new("x/y.jpg"), &RgbImage::new(1, 1))?;
        assert_eq!(snaps.paths(), vec![PathBuf::from("x/y.jpg")]);
        Ok(())
    }
}
