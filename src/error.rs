//! Engine error taxonomy.
//!
//! Errors are carried inside `anyhow::Error` like everywhere else in the crate.
//! Callers that need to tell a fatal condition apart from a degradable one
//! recover the variant with `err.downcast_ref::<EngineError>()`.

use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// Capture device could not be opened or read. Terminal for the run.
    SourceUnavailable { source: String, reason: String },
    /// Inference failed on a single frame. The frame is treated as empty.
    DetectorFailure { backend: String, reason: String },
    /// A log row could not be appended.
    LogWriteFailure { path: PathBuf, reason: String },
    /// An evidence image could not be written.
    SnapshotWriteFailure { path: PathBuf, reason: String },
    /// Zone configuration is unusable. Raised before the loop starts.
    MalformedZoneConfig { zone: String, reason: String },
    /// An existing log file carries a different header than expected.
    LogSchemaMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
    /// A frame does not match the dimensions fixed by the first frame.
    FrameDimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            EngineError::DetectorFailure { .. } => "DETECTOR_FAILURE",
            EngineError::LogWriteFailure { .. } => "LOG_WRITE_FAILURE",
            EngineError::SnapshotWriteFailure { .. } => "SNAPSHOT_WRITE_FAILURE",
            EngineError::MalformedZoneConfig { .. } => "MALFORMED_ZONE_CONFIG",
            EngineError::LogSchemaMismatch { .. } => "LOG_SCHEMA_MISMATCH",
            EngineError::FrameDimensionMismatch { .. } => "FRAME_DIMENSION_MISMATCH",
        }
    }

    /// Fatal errors end the run; everything else degrades to skip-and-continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::SourceUnavailable { .. }
                | EngineError::MalformedZoneConfig { .. }
                | EngineError::LogSchemaMismatch { .. }
        )
    }

    pub(crate) fn malformed_zone(zone: &str, reason: impl Into<String>) -> Self {
        EngineError::MalformedZoneConfig {
            zone: zone.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach a zone name to a zone error raised before the name was known.
    pub(crate) fn for_zone(self, name: &str) -> Self {
        match self {
            EngineError::MalformedZoneConfig { reason, .. } => EngineError::malformed_zone(name, reason),
            other => other,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SourceUnavailable { source, reason } => {
                write!(f, "{}: video source {} unavailable: {}", self.code(), source, reason)
            }
            EngineError::DetectorFailure { backend, reason } => {
                write!(f, "{}: detector {} failed: {}", self.code(), backend, reason)
            }
            EngineError::LogWriteFailure { path, reason } => {
                write!(f, "{}: {}: {}", self.code(), path.display(), reason)
            }
            EngineError::SnapshotWriteFailure { path, reason } => {
                write!(f, "{}: {}: {}", self.code(), path.display(), reason)
            }
            EngineError::MalformedZoneConfig { zone, reason } => {
                write!(f, "{}: zone '{}': {}", self.code(), zone, reason)
            }
            EngineError::LogSchemaMismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "{}: {} has header [{}], expected [{}]",
                self.code(),
                path.display(),
                found.join(", "),
                expected.join(", ")
            ),
            EngineError::FrameDimensionMismatch { expected, found } => write!(
                f,
                "{}: frame is {}x{}, run was started at {}x{}",
                self.code(),
                found.0,
                found.1,
                expected.0,
                expected.1
            ),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_survives_anyhow_round_trip() {
        let err: anyhow::Error = EngineError::malformed_zone("Zone A", "needs 3 vertices").into();
        let typed = err.downcast_ref::<EngineError>().expect("typed error");
        assert_eq!(typed.code(), "MALFORMED_ZONE_CONFIG");
        assert!(typed.is_fatal());
        assert!(err.to_string().contains("Zone A"));
    }

    #[test]
    fn write_failures_are_not_fatal() {
        let err = EngineError::LogWriteFailure {
            path: PathBuf::from("crowd_log.csv"),
            reason: "disk full".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "LOG_WRITE_FAILURE: crowd_log.csv: disk full"
        );
    }
}
