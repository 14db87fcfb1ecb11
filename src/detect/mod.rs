//! Object detection collaborators.
//!
//! The engine only sees the `Detector` trait. Which backend sits behind it
//! is a startup decision made by `open_detector`.

mod backend;
pub mod backends;
mod decode;
mod result;

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::error::EngineError;

pub use backend::{DeviceHint, Detector, DetectorSettings};
pub use backends::MarkerDetector;
pub use decode::{decode_yolov8, iou, non_max_suppression, YoloLayout, NMS_IOU_THRESHOLD};
pub use result::{BoundingBox, Detection, PERSON_CLASS};

/// Names accepted by `open_detector`.
pub const DETECTOR_BACKENDS: &[&str] = &["marker", "tract"];

/// Build the configured backend and warm it up.
pub fn open_detector(
    backend: &str,
    model_path: Option<&Path>,
    input_size: (u32, u32),
    settings: DetectorSettings,
) -> Result<Box<dyn Detector>> {
    let mut detector: Box<dyn Detector> = match backend {
        "marker" => Box::new(MarkerDetector::new(settings)),
        "tract" => open_tract(model_path, input_size, settings)?,
        other => {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {:?})",
                other,
                DETECTOR_BACKENDS
            ))
        }
    };
    detector.warm_up().map_err(|e| EngineError::DetectorFailure {
        backend: detector.name().to_string(),
        reason: format!("warm-up failed: {e:#}"),
    })?;
    log::info!(
        "detector: {} (confidence >= {}, device {})",
        detector.name(),
        settings.confidence_threshold,
        settings.device
    );
    Ok(detector)
}

#[cfg(feature = "backend-tract")]
fn open_tract(
    model_path: Option<&Path>,
    input_size: (u32, u32),
    settings: DetectorSettings,
) -> Result<Box<dyn Detector>> {
    let path = model_path.ok_or_else(|| anyhow!("tract backend requires detector.model_path"))?;
    Ok(Box::new(backends::TractBackend::new(path, input_size, settings)?))
}

#[cfg(not(feature = "backend-tract"))]
fn open_tract(
    _model_path: Option<&Path>,
    _input_size: (u32, u32),
    _settings: DetectorSettings,
) -> Result<Box<dyn Detector>> {
    Err(anyhow!("tract backend requires the backend-tract feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_rejected() {
        let err = open_detector("yolo9000", None, (640, 640), DetectorSettings::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown detector backend"));
    }

    #[test]
    fn marker_backend_opens_by_name() {
        let detector = open_detector("marker", None, (640, 640), DetectorSettings::default()).unwrap();
        assert_eq!(detector.name(), "marker");
    }
}
