use anyhow::{anyhow, Result};

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Where inference should run. Backends that cannot honour the hint fall
/// back to CPU and say so in the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceHint {
    #[default]
    Cpu,
    Cuda(u32),
}

impl std::str::FromStr for DeviceHint {
    type Err = anyhow::Error;

    /// Accepts `cpu`, `cuda`, `cuda:N`, or a bare GPU index.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s == "cpu" {
            return Ok(DeviceHint::Cpu);
        }
        if s == "cuda" {
            return Ok(DeviceHint::Cuda(0));
        }
        let index = s.strip_prefix("cuda:").unwrap_or(&s);
        index
            .parse::<u32>()
            .map(DeviceHint::Cuda)
            .map_err(|_| anyhow!("unrecognised device '{}', expected cpu, cuda or cuda:N", s))
    }
}

impl std::fmt::Display for DeviceHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceHint::Cpu => write!(f, "cpu"),
            DeviceHint::Cuda(index) => write!(f, "cuda:{}", index),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorSettings {
    /// Detections below this confidence are dropped by the backend.
    pub confidence_threshold: f32,
    pub device: DeviceHint,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.4,
            device: DeviceHint::Cpu,
        }
    }
}

/// Object detector.
///
/// `infer` sees one frame at a time and returns that frame's detections
/// only; backends keep no cross-frame state the engine relies on.
pub trait Detector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
