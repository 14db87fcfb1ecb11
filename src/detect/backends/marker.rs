use anyhow::Result;

use crate::detect::backend::{Detector, DetectorSettings};
use crate::detect::result::{BoundingBox, Detection, PERSON_CLASS};
use crate::frame::Frame;

/// Colour the synthetic source paints people with.
pub const PERSON_MARKER: [u8; 3] = [255, 0, 255];
/// Colour the synthetic source paints vehicles with (COCO class 2).
pub const VEHICLE_MARKER: [u8; 3] = [0, 255, 255];

const MARKER_CONFIDENCE: f32 = 0.9;
const DEFAULT_MIN_AREA: usize = 12;
const DEFAULT_TOLERANCE: u8 = 24;

#[derive(Clone, Copy, Debug)]
struct Marker {
    rgb: [u8; 3],
    class_id: u32,
}

/// Colour-marker detector.
///
/// Finds 4-connected regions of a marker colour and reports each region's
/// bounding box. Pairs with `stub://` sources; real footage needs a model.
pub struct MarkerDetector {
    settings: DetectorSettings,
    markers: Vec<Marker>,
    min_area: usize,
    tolerance: u8,
}

impl MarkerDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            markers: vec![
                Marker {
                    rgb: PERSON_MARKER,
                    class_id: PERSON_CLASS,
                },
                Marker {
                    rgb: VEHICLE_MARKER,
                    class_id: 2,
                },
            ],
            min_area: DEFAULT_MIN_AREA,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Regions with fewer pixels than this are ignored.
    pub fn with_min_area(mut self, min_area: usize) -> Self {
        self.min_area = min_area.max(1);
        self
    }

    fn matches(&self, pixel: [u8; 3], marker: [u8; 3]) -> bool {
        pixel
            .iter()
            .zip(marker.iter())
            .all(|(p, m)| p.abs_diff(*m) <= self.tolerance)
    }

    fn label(&self, pixel: [u8; 3]) -> Option<usize> {
        self.markers.iter().position(|m| self.matches(pixel, m.rgb))
    }
}

impl Detector for MarkerDetector {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if MARKER_CONFIDENCE < self.settings.confidence_threshold {
            return Ok(Vec::new());
        }
        let width = frame.width as usize;
        let height = frame.height as usize;
        let labels: Vec<Option<usize>> = frame
            .pixels()
            .chunks_exact(3)
            .map(|px| self.label([px[0], px[1], px[2]]))
            .collect();

        let mut visited = vec![false; labels.len()];
        let mut detections = Vec::new();
        let mut stack = Vec::new();
        for start in 0..labels.len() {
            let Some(marker) = labels[start] else {
                continue;
            };
            if visited[start] {
                continue;
            }
            visited[start] = true;
            stack.push(start);

            let (mut x1, mut y1) = (usize::MAX, usize::MAX);
            let (mut x2, mut y2) = (0usize, 0usize);
            let mut area = 0usize;
            while let Some(idx) = stack.pop() {
                let (x, y) = (idx % width, idx / width);
                area += 1;
                x1 = x1.min(x);
                y1 = y1.min(y);
                x2 = x2.max(x);
                y2 = y2.max(y);

                let mut visit = |n: usize| {
                    if !visited[n] && labels[n] == Some(marker) {
                        visited[n] = true;
                        stack.push(n);
                    }
                };
                if x > 0 {
                    visit(idx - 1);
                }
                if x + 1 < width {
                    visit(idx + 1);
                }
                if y > 0 {
                    visit(idx - width);
                }
                if y + 1 < height {
                    visit(idx + width);
                }
            }

            if area >= self.min_area {
                detections.push(Detection::new(
                    self.markers[marker].class_id,
                    MARKER_CONFIDENCE,
                    BoundingBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32),
                ));
            }
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn paint(frame_px: &mut [u8], width: u32, rect: (u32, u32, u32, u32), rgb: [u8; 3]) {
        let (x1, y1, x2, y2) = rect;
        for y in y1..=y2 {
            for x in x1..=x2 {
                let idx = ((y * width + x) * 3) as usize;
                frame_px[idx..idx + 3].copy_from_slice(&rgb);
            }
        }
    }

    fn scene(rects: &[((u32, u32, u32, u32), [u8; 3])]) -> Frame {
        let (w, h) = (40, 30);
        let mut pixels = vec![90u8; (w * h * 3) as usize];
        for (rect, rgb) in rects {
            paint(&mut pixels, w, *rect, *rgb);
        }
        Frame::with_clock(pixels, w, h, Instant::now(), chrono::Local::now()).unwrap()
    }

    #[test]
    fn finds_each_marker_region() -> Result<()> {
        let frame = scene(&[
            ((2, 3, 6, 10), PERSON_MARKER),
            ((20, 5, 25, 12), PERSON_MARKER),
            ((30, 20, 36, 26), VEHICLE_MARKER),
        ]);
        let mut detector = MarkerDetector::new(DetectorSettings::default());
        let mut found = detector.infer(&frame)?;
        found.sort_by_key(|d| d.bbox.x1);

        assert_eq!(found.len(), 3);
        assert_eq!(found[0].bbox, BoundingBox::new(2, 3, 6, 10));
        assert_eq!(found[0].class_id, PERSON_CLASS);
        assert_eq!(found[1].centroid(), crate::zone::Point::new(22, 8));
        assert_eq!(found[2].class_id, 2);
        Ok(())
    }

    #[test]
    fn small_regions_are_noise() -> Result<()> {
        let frame = scene(&[((5, 5, 6, 6), PERSON_MARKER)]);
        let mut detector = MarkerDetector::new(DetectorSettings::default());
        assert!(detector.infer(&frame)?.is_empty());

        let mut permissive = MarkerDetector::new(DetectorSettings::default()).with_min_area(4);
        assert_eq!(permissive.infer(&frame)?.len(), 1);
        Ok(())
    }

    #[test]
    fn threshold_above_marker_confidence_drops_everything() -> Result<()> {
        let frame = scene(&[((2, 3, 6, 10), PERSON_MARKER)]);
        let mut detector = MarkerDetector::new(DetectorSettings {
            confidence_threshold: 0.95,
            ..DetectorSettings::default()
        });
        assert!(detector.infer(&frame)?.is_empty());
        Ok(())
    }
}
