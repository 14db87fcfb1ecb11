//! Video sources.
//!
//! - `stub://` URLs produce a synthetic scene (tests, demos).
//! - Everything else goes through GStreamer (feature: capture-gstreamer):
//!   RTSP cameras, V4L2 devices and local video files.
//!
//! A source hands out frames until end of stream (`Ok(None)`). An `Err`
//! from `next_frame` is a capture failure and ends the run.

#[cfg(feature = "capture-gstreamer")]
mod pipeline;
pub mod synthetic;

use anyhow::Result;

use crate::error::EngineError;
use crate::frame::Frame;

pub use synthetic::{SyntheticScene, SyntheticSource};

/// Configuration for a video source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    /// `stub://name?people=N`, `rtsp://...`, `/dev/videoN`, or a file path.
    pub url: String,
    /// Target frame rate. Used for stall detection, not for decimation.
    pub target_fps: u32,
    /// Frame width for synthetic sources.
    pub width: u32,
    /// Frame height for synthetic sources.
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Pull-based frame source.
pub trait FrameSource: Send {
    /// Open the device or stream. Must be called before `next_frame`.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame. `Ok(None)` means end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;

    /// Release the device. Called once when the run stops.
    fn release(&mut self) {}
}

/// Pick a backend for `config.url` and connect it.
///
/// Any failure here is `SourceUnavailable`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    let unavailable = |reason: String| EngineError::SourceUnavailable {
        source: config.url.clone(),
        reason,
    };
    let mut source: Box<dyn FrameSource> = if config.url.starts_with("stub://") {
        Box::new(SyntheticSource::new(config).map_err(|e| unavailable(format!("{e:#}")))?)
    } else {
        open_device(config).map_err(|e| unavailable(format!("{e:#}")))?
    };
    source
        .connect()
        .map_err(|e| unavailable(format!("{e:#}")))?;
    Ok(source)
}

#[cfg(feature = "capture-gstreamer")]
fn open_device(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(pipeline::GstreamerSource::new(config.clone())?))
}

#[cfg(not(feature = "capture-gstreamer"))]
fn open_device(_config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("non-stub sources require the capture-gstreamer feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_urls_open_the_synthetic_source() -> Result<()> {
        let mut source = open_source(&SourceConfig {
            url: "stub://lobby?people=2&frames=1".to_string(),
            ..SourceConfig::default()
        })?;
        assert!(source.is_healthy());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[cfg(not(feature = "capture-gstreamer"))]
    #[test]
    fn device_urls_without_gstreamer_are_unavailable() {
        let err = open_source(&SourceConfig {
            url: "rtsp://10.0.0.5/stream".to_string(),
            ..SourceConfig::default()
        })
        .err()
        .unwrap();
        let typed = err.downcast_ref::<EngineError>().unwrap();
        assert_eq!(typed.code(), "SOURCE_UNAVAILABLE");
    }
}
