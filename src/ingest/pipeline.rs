//! GStreamer-backed capture: RTSP cameras, V4L2 devices and video files.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;

use crate::frame::Frame;
use crate::ingest::{FrameSource, SourceConfig, SourceStats};

pub struct GstreamerSource {
    config: SourceConfig,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    last_error: Option<String>,
}

/// Source element for a URL.
fn source_element(url: &str) -> String {
    if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
        format!("rtspsrc location={} latency=0 ! decodebin", url)
    } else if url.starts_with("/dev/video") {
        format!("v4l2src device={} ! decodebin", url)
    } else {
        let path = url.strip_prefix("file://").unwrap_or(url);
        format!("filesrc location=\"{}\" ! decodebin", path)
    }
}

impl GstreamerSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline_description = format!(
            "{} ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=1",
            source_element(&config.url)
        );
        let pipeline = gstreamer::parse::launch(&pipeline_description)
            .context("build capture pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("capture pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_sync(false);
        // Files must not drop frames; live cameras keep only the newest.
        appsink.set_drop(is_live(&config.url));

        Ok(Self {
            config,
            pipeline,
            appsink,
            frame_count: 0,
            last_frame_at: None,
            connected_at: None,
            last_error: None,
        })
    }

    fn frame_timeout(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            500
        } else {
            (1000 / self.config.target_fps).saturating_mul(4)
        };
        // First frame of an RTSP session can take a while to negotiate.
        let floor = if self.frame_count == 0 { 10_000 } else { 500 };
        Duration::from_millis(base_ms.max(floor) as u64)
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            if let MessageView::Error(err) = message.view() {
                self.last_error = Some(format!(
                    "gstreamer error from {:?}: {}",
                    err.src().map(|s| s.path_string()),
                    err.error()
                ));
            }
        }
    }
}

fn is_live(url: &str) -> bool {
    url.starts_with("rtsp://") || url.starts_with("rtsps://") || url.starts_with("/dev/video")
}

impl FrameSource for GstreamerSource {
    fn connect(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("set capture pipeline to Playing")?;
        self.connected_at = Some(Instant::now());
        log::info!("GstreamerSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.poll_bus();
        if let Some(err) = &self.last_error {
            return Err(anyhow!("{}", err));
        }

        let timeout = gstreamer::ClockTime::from_mseconds(self.frame_timeout().as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            if self.appsink.is_eos() {
                log::info!("GstreamerSource: end of stream on {}", self.config.url);
                return Ok(None);
            }
            self.poll_bus();
            return Err(anyhow!(
                self.last_error
                    .clone()
                    .unwrap_or_else(|| format!("{} stalled", self.config.url))
            ));
        };

        let (pixels, width, height) = sample_to_pixels(&sample)?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(pixels, width, height).map(Some)
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(10);
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }

    fn release(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("GstreamerSource: failed to stop pipeline: {}", err);
        }
        self.connected_at = None;
    }
}

impl Drop for GstreamerSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("sample missing buffer")?;
    let caps = sample.caps().context("sample missing caps")?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).context("parse caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map sample buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data.get(..len).context("sample buffer is too short")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(data.get(start..end).context("buffer row is out of bounds")?);
    }
    Ok((pixels, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_source_matches_url_kind() {
        assert!(source_element("rtsp://cam/stream").starts_with("rtspsrc"));
        assert!(source_element("/dev/video0").starts_with("v4l2src device=/dev/video0"));
        assert_eq!(
            source_element("file:///srv/lobby.mp4"),
            "filesrc location=\"/srv/lobby.mp4\" ! decodebin"
        );
        assert!(is_live("/dev/video2"));
        assert!(!is_live("clips/lobby.mp4"));
    }
}
