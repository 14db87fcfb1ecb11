//! YOLOv8 output decoding and non-maximum suppression.

use crate::detect::result::{BoundingBox, Detection};

/// Default IoU above which the lower-scoring of two same-class boxes is dropped.
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Layout of one YOLOv8 detection head output, `[1, 4 + classes, anchors]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct YoloLayout {
    pub classes: usize,
    pub anchors: usize,
}

impl YoloLayout {
    /// Derive the layout from a tensor shape.
    pub fn from_shape(shape: &[usize]) -> Option<Self> {
        match shape {
            [1, rows, anchors] if *rows > 4 => Some(Self {
                classes: rows - 4,
                anchors: *anchors,
            }),
            _ => None,
        }
    }
}

/// Turn raw head output into frame-space detections.
///
/// `scale` maps model input pixels to frame pixels per axis. Each anchor
/// keeps only its best class, and anchors under `confidence` are skipped.
pub fn decode_yolov8(
    data: &[f32],
    layout: YoloLayout,
    scale: (f32, f32),
    frame_size: (u32, u32),
    confidence: f32,
) -> Vec<Detection> {
    let n = layout.anchors;
    if data.len() < (4 + layout.classes) * n {
        return Vec::new();
    }
    let at = |row: usize, anchor: usize| data[row * n + anchor];
    let (max_x, max_y) = (frame_size.0 as f32, frame_size.1 as f32);

    let mut out = Vec::new();
    for anchor in 0..n {
        let best = (0..layout.classes)
            .map(|class| (class, at(4 + class, anchor)))
            .fold(None, |best: Option<(usize, f32)>, candidate| match best {
                Some(b) if b.1 >= candidate.1 => Some(b),
                _ => Some(candidate),
            });
        let Some((class_id, score)) = best else {
            continue;
        };
        if !(score >= confidence) {
            continue;
        }
        let (cx, cy) = (at(0, anchor) * scale.0, at(1, anchor) * scale.1);
        let (w, h) = (at(2, anchor) * scale.0, at(3, anchor) * scale.1);
        let bbox = BoundingBox::from_xyxy(
            (cx - w / 2.0).clamp(0.0, max_x),
            (cy - h / 2.0).clamp(0.0, max_y),
            (cx + w / 2.0).clamp(0.0, max_x),
            (cy + h / 2.0).clamp(0.0, max_y),
        );
        out.push(Detection::new(class_id as u32, score, bbox));
    }
    out
}

pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0) as f32;
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0) as f32;
    let inter = ix * iy;
    let area = |r: &BoundingBox| (r.width() as f32) * (r.height() as f32);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy per-class NMS, highest confidence first. Survivors stay sorted
/// by descending confidence.
pub fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..detections.len() {
        let candidate = detections[index];
        let overlaps = detections[..kept].iter().any(|prev| {
            prev.class_id == candidate.class_id && iou(&prev.bbox, &candidate.bbox) > iou_threshold
        });
        if !overlaps {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_requires_batch_of_one() {
        assert_eq!(
            YoloLayout::from_shape(&[1, 84, 8400]),
            Some(YoloLayout {
                classes: 80,
                anchors: 8400
            })
        );
        assert_eq!(YoloLayout::from_shape(&[2, 84, 8400]), None);
        assert_eq!(YoloLayout::from_shape(&[1, 4, 10]), None);
    }

    #[test]
    fn decode_scales_boxes_and_picks_best_class() {
        // two anchors, two classes; rows are cx, cy, w, h, class0, class1
        let data = vec![
            10.0, 50.0, // cx
            10.0, 50.0, // cy
            4.0, 10.0, // w
            6.0, 10.0, // h
            0.8, 0.1, // class 0
            0.3, 0.2, // class 1
        ];
        let layout = YoloLayout {
            classes: 2,
            anchors: 2,
        };
        let found = decode_yolov8(&data, layout, (2.0, 2.0), (640, 480), 0.4);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_id, 0);
        assert_eq!(found[0].bbox, BoundingBox::new(16, 14, 24, 26));
    }

    #[test]
    fn nms_keeps_best_of_overlapping_same_class_boxes() {
        let mut dets = vec![
            Detection::new(0, 0.6, BoundingBox::new(0, 0, 10, 10)),
            Detection::new(0, 0.9, BoundingBox::new(1, 1, 11, 11)),
            Detection::new(2, 0.5, BoundingBox::new(1, 1, 11, 11)),
            Detection::new(0, 0.7, BoundingBox::new(50, 50, 60, 60)),
        ];
        non_max_suppression(&mut dets, NMS_IOU_THRESHOLD);
        let kept: Vec<(u32, f32)> = dets.iter().map(|d| (d.class_id, d.confidence)).collect();
        assert_eq!(kept, vec![(0, 0.9), (0, 0.7), (2, 0.5)]);
    }
}
