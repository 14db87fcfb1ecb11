use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{DetectorSettings, DeviceHint, DETECTOR_BACKENDS, PERSON_CLASS};
use crate::engine::{CrowdSettings, IntrusionSettings};
use crate::error::EngineError;
use crate::event_log::HeaderPolicy;
use crate::evidence::AlarmTone;
use crate::ingest::SourceConfig;
use crate::zone::{Point, Zone, ZoneSet};

const DEFAULT_SOURCE_URL: &str = "stub://camera0";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

const DEFAULT_DETECTOR: &str = "marker";
const DEFAULT_CONFIDENCE: f32 = 0.4;
const DEFAULT_INPUT_SIZE: u32 = 640;

const DEFAULT_RESTRICTED_ZONE: &str = "Restricted";
const DEFAULT_RESTRICTED_POLYGON: [(i32, i32); 4] = [(320, 0), (640, 0), (640, 480), (320, 480)];
const DEFAULT_CAPTURE_DIR: &str = "intrusion_detection/captures";
const DEFAULT_INTRUSION_LOG: &str = "intrusion_detection/intrusion_log.csv";
const DEFAULT_CAPTURE_INTERVAL_SECS: f64 = 30.0;
const DEFAULT_EVENT_LABEL: &str = "Restricted Area Breach";
const DEFAULT_INTRUSION_TONE: AlarmTone = AlarmTone::new(1500, 700);

const MIN_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_MAX_CAPACITY: usize = 20;
const DEFAULT_SNAPSHOT_DIR: &str = "person_detection/crowd_snapshots";
const DEFAULT_CROWD_EVENT_LOG: &str = "person_detection/crowd_events.csv";
const DEFAULT_COUNT_LOG: &str = "person_detection/crowd_log.csv";
const DEFAULT_SNAPSHOT_INTERVAL_SECS: f64 = 30.0;
const DEFAULT_COUNT_LOG_INTERVAL_SECS: f64 = 60.0;
const DEFAULT_HEATMAP_ALPHA: f32 = 0.6;
const DEFAULT_CROWD_TONE: AlarmTone = AlarmTone::new(1200, 600);

/// Top and bottom halves of a 640x480 frame.
fn default_crowd_zones() -> Vec<(&'static str, Vec<(i32, i32)>)> {
    vec![
        ("Zone A", vec![(0, 0), (640, 0), (640, 240), (0, 240)]),
        ("Zone B", vec![(0, 240), (640, 240), (640, 480), (0, 480)]),
    ]
}

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    intrusion: Option<IntrusionConfigFile>,
    crowd: Option<CrowdConfigFile>,
    alarm: Option<AlarmConfigFile>,
    logs: Option<LogsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    confidence: Option<f32>,
    device: Option<String>,
    target_class: Option<u32>,
    input_size: Option<[u32; 2]>,
}

#[derive(Debug, Deserialize, Default)]
struct IntrusionConfigFile {
    zone: Option<ZoneConfigFile>,
    capture_dir: Option<PathBuf>,
    log_path: Option<PathBuf>,
    capture_interval_secs: Option<f64>,
    event_label: Option<String>,
    tone: Option<ToneConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CrowdConfigFile {
    zones: Option<Vec<ZoneConfigFile>>,
    max_capacity: Option<usize>,
    snapshot_dir: Option<PathBuf>,
    event_log_path: Option<PathBuf>,
    count_log_path: Option<PathBuf>,
    snapshot_interval_secs: Option<f64>,
    count_log_interval_secs: Option<f64>,
    heatmap_alpha: Option<f32>,
    tone: Option<ToneConfigFile>,
}

#[derive(Debug, Deserialize)]
struct ZoneConfigFile {
    name: String,
    polygon: Vec<RawVertex>,
}

/// A vertex as written in the file. Anything that is not a pair of
/// integers is kept so it can be reported as a zone error.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVertex {
    Pair([i64; 2]),
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize, Default)]
struct ToneConfigFile {
    frequency_hz: Option<u32>,
    duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct AlarmConfigFile {
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct LogsConfigFile {
    header_policy: Option<HeaderPolicy>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub source: SourceConfig,
    pub detector: DetectorConfig,
    pub intrusion: IntrusionConfig,
    pub crowd: CrowdConfig,
    pub alarm_enabled: bool,
    pub header_policy: HeaderPolicy,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// `marker` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub settings: DetectorSettings,
    /// Class id the engine counts; 0 is "person".
    pub target_class: u32,
    /// Model input width and height.
    pub input_size: (u32, u32),
}

#[derive(Debug, Clone)]
pub struct IntrusionConfig {
    pub zone: Zone,
    pub log_path: PathBuf,
    pub settings: IntrusionSettings,
}

#[derive(Debug, Clone)]
pub struct CrowdConfig {
    pub zones: ZoneSet,
    pub event_log_path: PathBuf,
    pub count_log_path: PathBuf,
    pub settings: CrowdSettings,
}

impl EngineConfig {
    /// Load `path` (or `$ZONEWATCH_CONFIG`), apply environment overrides,
    /// then validate. Without any file every value is a default.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("ZONEWATCH_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults only, no file and no environment.
    pub fn defaults() -> Result<Self> {
        let mut cfg = Self::from_file(EngineConfigFile::default())?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: EngineConfigFile) -> Result<Self> {
        let source_file = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source_file.width.unwrap_or(DEFAULT_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_HEIGHT),
        };

        let detector_file = file.detector.unwrap_or_default();
        let device = match detector_file.device.as_deref() {
            Some(device) => device.parse()?,
            None => DeviceHint::Cpu,
        };
        let input_size = detector_file
            .input_size
            .map(|[w, h]| (w, h))
            .unwrap_or((DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE));
        let detector = DetectorConfig {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
            model_path: detector_file.model_path,
            settings: DetectorSettings {
                confidence_threshold: detector_file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                device,
            },
            target_class: detector_file.target_class.unwrap_or(PERSON_CLASS),
            input_size,
        };

        let intrusion_file = file.intrusion.unwrap_or_default();
        let zone = match intrusion_file.zone {
            Some(zone) => build_zone(zone)?,
            None => Zone::new(
                DEFAULT_RESTRICTED_ZONE,
                DEFAULT_RESTRICTED_POLYGON.iter().copied().map(Point::from).collect(),
            )?,
        };
        let intrusion = IntrusionConfig {
            zone,
            log_path: intrusion_file
                .log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INTRUSION_LOG)),
            settings: IntrusionSettings {
                capture_dir: intrusion_file
                    .capture_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CAPTURE_DIR)),
                capture_interval: seconds(
                    "intrusion.capture_interval_secs",
                    intrusion_file
                        .capture_interval_secs
                        .unwrap_or(DEFAULT_CAPTURE_INTERVAL_SECS),
                )?,
                event_label: intrusion_file
                    .event_label
                    .unwrap_or_else(|| DEFAULT_EVENT_LABEL.to_string()),
                tone: tone(intrusion_file.tone, DEFAULT_INTRUSION_TONE),
            },
        };

        let crowd_file = file.crowd.unwrap_or_default();
        let zones = match crowd_file.zones {
            Some(zones) => zones
                .into_iter()
                .map(build_zone)
                .collect::<Result<Vec<_>>>()?,
            None => default_crowd_zones()
                .into_iter()
                .map(|(name, vertices)| {
                    Zone::new(name, vertices.into_iter().map(Point::from).collect())
                })
                .collect::<Result<Vec<_>>>()?,
        };
        let crowd = CrowdConfig {
            zones: ZoneSet::new(zones)?,
            event_log_path: crowd_file
                .event_log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CROWD_EVENT_LOG)),
            count_log_path: crowd_file
                .count_log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_COUNT_LOG)),
            settings: CrowdSettings {
                max_capacity: crowd_file.max_capacity.unwrap_or(DEFAULT_MAX_CAPACITY),
                snapshot_dir: crowd_file
                    .snapshot_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
                snapshot_interval: seconds(
                    "crowd.snapshot_interval_secs",
                    crowd_file
                        .snapshot_interval_secs
                        .unwrap_or(DEFAULT_SNAPSHOT_INTERVAL_SECS),
                )?,
                count_log_interval: seconds(
                    "crowd.count_log_interval_secs",
                    crowd_file
                        .count_log_interval_secs
                        .unwrap_or(DEFAULT_COUNT_LOG_INTERVAL_SECS),
                )?,
                heatmap_alpha: crowd_file.heatmap_alpha.unwrap_or(DEFAULT_HEATMAP_ALPHA),
                tone: tone(crowd_file.tone, DEFAULT_CROWD_TONE),
            },
        };

        Ok(Self {
            source,
            detector,
            intrusion,
            crowd,
            alarm_enabled: file.alarm.and_then(|alarm| alarm.enabled).unwrap_or(true),
            header_policy: file
                .logs
                .and_then(|logs| logs.header_policy)
                .unwrap_or_default(),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("ZONEWATCH_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(backend) = std::env::var("ZONEWATCH_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("ZONEWATCH_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(confidence) = std::env::var("ZONEWATCH_CONFIDENCE") {
            self.detector.settings.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("ZONEWATCH_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Ok(device) = std::env::var("ZONEWATCH_DEVICE") {
            if !device.trim().is_empty() {
                self.detector.settings.device = device
                    .parse()
                    .context("ZONEWATCH_DEVICE is not a valid device")?;
            }
        }
        if let Ok(capacity) = std::env::var("ZONEWATCH_MAX_CAPACITY") {
            self.crowd.settings.max_capacity = capacity
                .trim()
                .parse()
                .map_err(|_| anyhow!("ZONEWATCH_MAX_CAPACITY must be a positive integer"))?;
        }
        if let Ok(alarm) = std::env::var("ZONEWATCH_ALARM") {
            self.alarm_enabled = !matches!(
                alarm.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if !DETECTOR_BACKENDS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "detector backend must be one of {:?}, got '{}'",
                DETECTOR_BACKENDS,
                self.detector.backend
            ));
        }
        let confidence = self.detector.settings.confidence_threshold;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!("detector confidence must be within 0..=1, got {}", confidence));
        }
        if self.detector.input_size.0 == 0 || self.detector.input_size.1 == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        if self.crowd.settings.max_capacity == 0 {
            return Err(anyhow!("crowd max_capacity must be at least 1"));
        }
        if self.crowd.zones.is_empty() {
            return Err(EngineError::malformed_zone("<crowd>", "at least one crowd zone is required").into());
        }
        // snapshot names have one-second resolution
        for (field, interval) in [
            ("intrusion.capture_interval_secs", self.intrusion.settings.capture_interval),
            ("crowd.snapshot_interval_secs", self.crowd.settings.snapshot_interval),
        ] {
            if interval < MIN_SNAPSHOT_INTERVAL {
                return Err(anyhow!(
                    "{} must be at least {} second, got {:?}",
                    field,
                    MIN_SNAPSHOT_INTERVAL.as_secs(),
                    interval
                ));
            }
        }
        let alpha = self.crowd.settings.heatmap_alpha;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(anyhow!("crowd heatmap_alpha must be within 0..=1, got {}", alpha));
        }
        Ok(())
    }
}

fn build_zone(file: ZoneConfigFile) -> Result<Zone> {
    let mut vertices = Vec::with_capacity(file.polygon.len());
    for (index, vertex) in file.polygon.into_iter().enumerate() {
        let point = match vertex {
            RawVertex::Pair([x, y]) => match (i32::try_from(x), i32::try_from(y)) {
                (Ok(x), Ok(y)) => Point::new(x, y),
                _ => {
                    return Err(EngineError::malformed_zone(
                        &file.name,
                        format!("vertex {} ({}, {}) is outside the i32 range", index, x, y),
                    )
                    .into())
                }
            },
            RawVertex::Other(value) => {
                return Err(EngineError::malformed_zone(
                    &file.name,
                    format!("vertex {} must be a pair of integers, got {}", index, value),
                )
                .into())
            }
        };
        vertices.push(point);
    }
    Zone::new(&file.name, vertices)
}

fn seconds(field: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return Err(anyhow!("{} must be greater than zero, got {}", field, value));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|_| anyhow!("{} is too large to be a duration, got {}", field, value))
}

fn tone(file: Option<ToneConfigFile>, default: AlarmTone) -> AlarmTone {
    let file = file.unwrap_or_default();
    AlarmTone::new(
        file.frequency_hz.unwrap_or(default.frequency_hz),
        file.duration_ms.unwrap_or(default.duration_ms),
    )
}

fn read_config_file(path: &Path) -> Result<EngineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
