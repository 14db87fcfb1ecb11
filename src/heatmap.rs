//! Cumulative detection density.
//!
//! The field counts how many detection centroids have landed on each pixel
//! since the run started. It never decays and is never reset implicitly;
//! rendering produces a derived 0..=255 view and leaves the counts alone.

use anyhow::{anyhow, Result};
use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::error::EngineError;
use crate::zone::Point;

/// Per-pixel centroid counts, row-major, `height x width`.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityField {
    width: u32,
    height: u32,
    cells: Vec<f64>,
}

impl DensityField {
    pub fn new(height: u32, width: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![0.0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Increment the cell under each point by one.
    ///
    /// Points outside the field are dropped silently; they come from
    /// centroid rounding at frame edges. Returns how many were counted.
    pub fn accumulate(&mut self, points: &[Point]) -> usize {
        let mut counted = 0;
        for p in points {
            if let Some(idx) = self.index(p.x, p.y) {
                self.cells[idx] += 1.0;
                counted += 1;
            }
        }
        counted
    }

    pub fn value(&self, x: i32, y: i32) -> Option<f64> {
        self.index(x, y).map(|idx| self.cells[idx])
    }

    pub fn total(&self) -> f64 {
        self.cells.iter().sum()
    }

    /// Min-max normalised 8-bit view of the field.
    ///
    /// A field with no spread (including all zeros) renders as all zeros.
    pub fn render_normalized(&self) -> GrayImage {
        let (min, max) = self
            .cells
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;
        let mut out = GrayImage::new(self.width, self.height);
        if !(range > 0.0) {
            return out;
        }
        for (i, pixel) in out.pixels_mut().enumerate() {
            let scaled = (self.cells[i] - min) / range * 255.0;
            *pixel = Luma([scaled.round().clamp(0.0, 255.0) as u8]);
        }
        out
    }

    /// Blend the JET-coloured normalised field over a frame image:
    /// `out = frame * (1 - alpha) + heat * alpha`.
    pub fn overlay(&self, frame: &RgbImage, alpha: f32) -> Result<RgbImage> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(EngineError::FrameDimensionMismatch {
                expected: (self.width, self.height),
                found: frame.dimensions(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(anyhow!("heatmap alpha must be within 0..=1, got {alpha}"));
        }
        let heat = self.render_normalized();
        let mut out = RgbImage::new(self.width, self.height);
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let base = frame.get_pixel(x, y).0;
            let tint = jet(heat.get_pixel(x, y).0[0]);
            let mut mixed = [0u8; 3];
            for c in 0..3 {
                let v = base[c] as f32 * (1.0 - alpha) + tint[c] as f32 * alpha;
                mixed[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            *pixel = Rgb(mixed);
        }
        Ok(out)
    }
}

/// JET colour ramp: 0 is dark blue, 255 is dark red. Returns RGB.
pub fn jet(value: u8) -> [u8; 3] {
    let v = value as f32 / 255.0;
    let channel = |offset: f32| {
        let c = (1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0);
        (c * 255.0).round() as u8
    };
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Lazily sized density field.
///
/// The first frame fixes the dimensions for the lifetime of the run.
#[derive(Debug, Default)]
pub struct DensityAccumulator {
    field: Option<DensityField>,
}

impl DensityAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the field. Repeating the call with the same dimensions is a
    /// no-op; different dimensions are rejected.
    pub fn initialize(&mut self, height: u32, width: u32) -> Result<()> {
        match &self.field {
            None => {
                log::debug!("heatmap initialised at {}x{}", width, height);
                self.field = Some(DensityField::new(height, width));
                Ok(())
            }
            Some(field) if field.width == width && field.height == height => Ok(()),
            Some(field) => Err(EngineError::FrameDimensionMismatch {
                expected: (field.width, field.height),
                found: (width, height),
            }
            .into()),
        }
    }

    pub fn accumulate(&mut self, points: &[Point]) -> Result<usize> {
        let field = self
            .field
            .as_mut()
            .ok_or_else(|| anyhow!("heatmap accumulated before initialisation"))?;
        Ok(field.accumulate(points))
    }

    /// Initialise on first use, then accumulate.
    pub fn observe(&mut self, width: u32, height: u32, points: &[Point]) -> Result<usize> {
        self.initialize(height, width)?;
        self.accumulate(points)
    }

    pub fn field(&self) -> Option<&DensityField> {
        self.field.as_ref()
    }

    /// Normalised view of the field; `None` before the first frame.
    pub fn render_normalized(&self) -> Option<GrayImage> {
        self.field.as_ref().map(DensityField::render_normalized)
    }
}
