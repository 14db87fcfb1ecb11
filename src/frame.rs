//! Video frames as seen by the engine.
//!
//! - `Frame`: RGB8 pixels plus capture timestamps. Pixels are private; the
//!   detector reads them through `pixels()` and evidence writers through
//!   `to_rgb_image()`.
//! - `FrameContext`: the dimensions and clocks of a frame without its pixels.
//!
//! Two clocks are captured per frame. The monotonic `Instant` drives
//! cooldowns; the wall clock only labels log rows and snapshot names.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use image::RgbImage;
use std::time::Instant;

/// Bytes per pixel (packed RGB).
pub const CHANNELS: usize = 3;

pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    captured_at: Instant,
    wall_clock: DateTime<Local>,
}

impl Frame {
    /// Wrap freshly captured pixels, stamping both clocks now.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        Self::with_clock(pixels, width, height, Instant::now(), Local::now())
    }

    /// Wrap pixels with explicit timestamps (replayed footage, tests).
    pub fn with_clock(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        captured_at: Instant,
        wall_clock: DateTime<Local>,
    ) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            captured_at,
            wall_clock,
        })
    }

    /// Uniform frame of a single colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], captured_at: Instant) -> Result<Self> {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * CHANNELS)
            .collect();
        Self::with_clock(pixels, width, height, captured_at, Local::now())
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn wall_clock(&self) -> DateTime<Local> {
        self.wall_clock
    }

    pub fn context(&self) -> FrameContext {
        FrameContext {
            width: self.width,
            height: self.height,
            captured_at: self.captured_at,
            wall_clock: self.wall_clock,
        }
    }

    /// Pixel at (x, y), or `None` outside the frame.
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some([self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]])
    }

    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("wall_clock", &self.wall_clock)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FrameContext {
    pub width: u32,
    pub height: u32,
    pub captured_at: Instant,
    pub wall_clock: DateTime<Local>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_short_buffers() {
        let err = Frame::new(vec![0u8; 10], 4, 4).unwrap_err();
        assert!(err.to_string().contains("expected 48 RGB bytes"));
    }

    #[test]
    fn frame_rejects_zero_dimensions() {
        assert!(Frame::new(Vec::new(), 0, 10).is_err());
    }

    #[test]
    fn filled_frame_reports_pixels_and_context() -> Result<()> {
        let now = Instant::now();
        let frame = Frame::filled(3, 2, [10, 20, 30], now)?;
        assert_eq!(frame.pixels().len(), 18);
        assert_eq!(frame.rgb_at(2, 1), Some([10, 20, 30]));
        assert_eq!(frame.rgb_at(3, 0), None);

        let ctx = frame.context();
        assert_eq!((ctx.width, ctx.height), (3, 2));
        assert_eq!(ctx.captured_at, now);

        let img = frame.to_rgb_image()?;
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30]);
        Ok(())
    }
}
