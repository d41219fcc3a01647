//! Decoding of YOLO-style plate detector output.
//!
//! The detector emits `[5, N]` (optionally with a leading batch axis) where the
//! attribute rows are `cx, cy, w, h, score` in normalized image coordinates.
//! Overlapping candidates are collapsed with a greedy centre-distance rule:
//! boxes are visited in tensor order and a candidate is dropped when its centre
//! lies within `center_distance_epsilon` pixels, on both axes, of a box that was
//! already accepted. There is no score re-ranking, so the first index wins.

use common::{CropRegion, Detection, PixelRect};
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};
use tracing::{debug, warn};

const NUM_ATTRIBUTES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionDecoder {
    pub score_threshold: f32,
    pub center_distance_epsilon: f32,
}

impl Default for DetectionDecoder {
    fn default() -> Self {
        Self {
            score_threshold: 0.08,
            center_distance_epsilon: 400.0,
        }
    }
}

impl DetectionDecoder {
    pub fn new(score_threshold: f32, center_distance_epsilon: f32) -> Self {
        Self {
            score_threshold,
            center_distance_epsilon,
        }
    }

    /// Convert detector output into deduplicated detections in the pixel space
    /// of an `image_width` x `image_height` image.
    ///
    /// Never fails: an unexpected tensor shape yields no detections, and NaN
    /// scores fail the threshold comparison.
    pub fn decode(
        &self,
        output: ArrayViewD<'_, f32>,
        image_width: u32,
        image_height: u32,
    ) -> Vec<Detection> {
        let shape = output.shape().to_vec();
        let Some(attributes) = attribute_rows(output) else {
            warn!(shape = ?shape, "Unexpected detector output shape, expected [5, N] or [1, 5, N]");
            return Vec::new();
        };

        let width = image_width as f32;
        let height = image_height as f32;
        let eps = self.center_distance_epsilon;

        let mut accepted_centers: Vec<(f32, f32)> = Vec::new();
        let mut detections = Vec::new();
        let mut below_threshold = 0u64;
        let mut suppressed = 0u64;

        for i in 0..attributes.ncols() {
            let score = attributes[[4, i]];
            if !(score >= self.score_threshold) {
                below_threshold += 1;
                continue;
            }

            let cx = attributes[[0, i]];
            let cy = attributes[[1, i]];
            let w = attributes[[2, i]];
            let h = attributes[[3, i]];

            let rect = pixel_corners(cx, cy, w, h, width, height);

            let (px, py) = (cx * width, cy * height);
            let duplicate = accepted_centers
                .iter()
                .any(|&(ax, ay)| (px - ax).abs() < eps && (py - ay).abs() < eps);
            if duplicate {
                suppressed += 1;
                continue;
            }

            // Later candidates compare against the unclamped box centre
            accepted_centers.push(rect.center());
            detections.push(Detection {
                bounding_box: rect.clamped(image_width, image_height),
                score,
            });
        }

        telemetry::metrics::DETECTIONS_DECODED
            .with_label_values(&["below_threshold"])
            .inc_by(below_threshold);
        telemetry::metrics::DETECTIONS_DECODED
            .with_label_values(&["suppressed"])
            .inc_by(suppressed);
        telemetry::metrics::DETECTIONS_DECODED
            .with_label_values(&["accepted"])
            .inc_by(detections.len() as u64);

        debug!(
            candidates = attributes.ncols(),
            accepted = detections.len(),
            suppressed,
            below_threshold,
            "Decoded detector output"
        );

        detections
    }
}

/// Score-filtered boxes in tensor order, unclamped and without any
/// suppression. Malformed tensors yield nothing.
pub fn scored_boxes(
    output: ArrayViewD<'_, f32>,
    score_threshold: f32,
    image_width: u32,
    image_height: u32,
) -> Vec<Detection> {
    let Some(attributes) = attribute_rows(output) else {
        warn!("Unexpected detector output shape, expected [5, N] or [1, 5, N]");
        return Vec::new();
    };

    let width = image_width as f32;
    let height = image_height as f32;
    (0..attributes.ncols())
        .filter(|&i| attributes[[4, i]] >= score_threshold)
        .map(|i| Detection {
            bounding_box: pixel_corners(
                attributes[[0, i]],
                attributes[[1, i]],
                attributes[[2, i]],
                attributes[[3, i]],
                width,
                height,
            ),
            score: attributes[[4, i]],
        })
        .collect()
}

/// Intersection over union of two boxes; 0 when either has no area
pub fn iou(a: &PixelRect, b: &PixelRect) -> f32 {
    let x1 = a.left.max(b.left);
    let y1 = a.top.max(b.top);
    let x2 = a.right.min(b.right);
    let y2 = a.bottom.min(b.bottom);

    let intersection = if x2 > x1 && y2 > y1 {
        (x2 - x1) * (y2 - y1)
    } else {
        0.0
    };

    let area_a = a.width().max(0.0) * a.height().max(0.0);
    let area_b = b.width().max(0.0) * b.height().max(0.0);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy non-maximum suppression: highest score first, dropping every box
/// whose IoU with a kept box reaches `iou_threshold`. Equal scores keep
/// tensor order.
pub fn non_max_suppression(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if keep
            .iter()
            .all(|kept| iou(&kept.bounding_box, &candidate.bounding_box) < iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn pixel_corners(cx: f32, cy: f32, w: f32, h: f32, width: f32, height: f32) -> PixelRect {
    PixelRect::new(
        (cx - w / 2.0) * width,
        (cy - h / 2.0) * height,
        (cx + w / 2.0) * width,
        (cy + h / 2.0) * height,
    )
}

fn attribute_rows(output: ArrayViewD<'_, f32>) -> Option<ArrayView2<'_, f32>> {
    let rows = match output.ndim() {
        2 => output.into_dimensionality::<Ix2>().ok()?,
        3 if output.shape()[0] > 0 => output
            .index_axis_move(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .ok()?,
        _ => return None,
    };
    (rows.nrows() >= NUM_ATTRIBUTES).then_some(rows)
}

/// Pair each detection with its integer crop, skipping boxes that have no area
/// once clamped to the image.
pub fn crop_regions(
    detections: &[Detection],
    image_width: u32,
    image_height: u32,
) -> Vec<(Detection, CropRegion)> {
    detections
        .iter()
        .filter_map(|detection| {
            match CropRegion::from_rect(&detection.bounding_box, image_width, image_height) {
                Some(region) => Some((*detection, region)),
                None => {
                    telemetry::metrics::DEGENERATE_CROPS.inc();
                    debug!(bbox = ?detection.bounding_box, "Skipping degenerate detection");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    /// Build a `[5, N]` tensor from `(cx, cy, w, h, score)` rows
    fn tensor(boxes: &[(f32, f32, f32, f32, f32)]) -> Array2<f32> {
        let mut output = Array2::zeros((5, boxes.len()));
        for (i, &(cx, cy, w, h, s)) in boxes.iter().enumerate() {
            output[[0, i]] = cx;
            output[[1, i]] = cy;
            output[[2, i]] = w;
            output[[3, i]] = h;
            output[[4, i]] = s;
        }
        output
    }

    #[test]
    fn test_decode_converts_to_pixel_corners() {
        let output = tensor(&[(0.5, 0.5, 0.2, 0.1, 0.9)]);
        let detections = DetectionDecoder::default().decode(output.view().into_dyn(), 1000, 800);

        assert_eq!(detections.len(), 1);
        let rect = detections[0].bounding_box;
        assert!((rect.left - 400.0).abs() < 1e-3);
        assert!((rect.top - 360.0).abs() < 1e-3);
        assert!((rect.right - 600.0).abs() < 1e-3);
        assert!((rect.bottom - 440.0).abs() < 1e-3);
        assert_eq!(detections[0].score, 0.9);
    }

    #[test]
    fn test_decode_filters_by_threshold() {
        let output = tensor(&[
            (0.1, 0.1, 0.1, 0.1, 0.07),
            (0.9, 0.9, 0.1, 0.1, 0.08),
        ]);
        let detections = DetectionDecoder::default().decode(output.view().into_dyn(), 2000, 2000);

        // Threshold is inclusive: 0.08 passes, 0.07 does not
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].score, 0.08);
    }

    #[test]
    fn test_decode_first_index_wins_regardless_of_score() {
        // Centres 100px apart on a 2000px image, well inside the 400px epsilon
        let output = tensor(&[
            (0.50, 0.50, 0.1, 0.05, 0.2),
            (0.55, 0.52, 0.1, 0.05, 0.95),
        ]);
        let detections = DetectionDecoder::default().decode(output.view().into_dyn(), 2000, 2000);

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].score, 0.2);
    }

    #[test]
    fn test_decode_requires_both_axes_within_epsilon() {
        // Same row, 600px apart horizontally: not duplicates
        let output = tensor(&[
            (0.2, 0.5, 0.1, 0.05, 0.5),
            (0.5, 0.5, 0.1, 0.05, 0.5),
        ]);
        let detections = DetectionDecoder::default().decode(output.view().into_dyn(), 2000, 2000);
        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn test_decode_epsilon_is_strict() {
        // Exactly 400px apart on x (800 vs 1200) and 0 on y: not suppressed.
        // Dyadic fractions keep the pixel arithmetic exact.
        let output = tensor(&[
            (0.25, 0.5, 0.125, 0.0625, 0.5),
            (0.375, 0.5, 0.125, 0.0625, 0.5),
        ]);
        let decoder = DetectionDecoder::new(0.08, 400.0);
        let detections = decoder.decode(output.view().into_dyn(), 3200, 3200);
        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn test_decode_suppression_only_checks_accepted_boxes() {
        // Box 1 is below threshold, so it cannot suppress box 2
        let output = tensor(&[
            (0.5, 0.5, 0.1, 0.05, 0.01),
            (0.5, 0.5, 0.1, 0.05, 0.60),
        ]);
        let detections = DetectionDecoder::default().decode(output.view().into_dyn(), 2000, 2000);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].score, 0.60);
    }

    #[test]
    fn test_decode_clamps_to_image() {
        let output = tensor(&[(0.02, 0.98, 0.2, 0.2, 0.9)]);
        let detections = DetectionDecoder::default().decode(output.view().into_dyn(), 640, 480);

        let rect = detections[0].bounding_box;
        assert_eq!(rect.left, 0.0);
        assert_eq!(rect.bottom, 480.0);
        assert!(rect.right <= 640.0 && rect.top >= 0.0);
    }

    #[test]
    fn test_decode_ignores_nan_scores() {
        let output = tensor(&[(0.5, 0.5, 0.1, 0.1, f32::NAN)]);
        let detections = DetectionDecoder::default().decode(output.view().into_dyn(), 640, 640);
        assert!(detections.is_empty());
    }

    #[test]
    fn test_decode_accepts_batch_axis() {
        let mut output = Array3::<f32>::zeros((1, 5, 3));
        output[[0, 0, 2]] = 0.5;
        output[[0, 1, 2]] = 0.5;
        output[[0, 2, 2]] = 0.1;
        output[[0, 3, 2]] = 0.1;
        output[[0, 4, 2]] = 0.7;

        let detections = DetectionDecoder::default().decode(output.view().into_dyn(), 640, 640);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].score, 0.7);
    }

    #[test]
    fn test_decode_empty_and_malformed_tensors() {
        let decoder = DetectionDecoder::default();

        let empty = Array2::<f32>::zeros((5, 0));
        assert!(decoder.decode(empty.view().into_dyn(), 640, 640).is_empty());

        let too_few_rows = Array2::<f32>::ones((4, 10));
        assert!(decoder.decode(too_few_rows.view().into_dyn(), 640, 640).is_empty());

        let flat = ndarray::Array1::<f32>::ones(5);
        assert!(decoder.decode(flat.view().into_dyn(), 640, 640).is_empty());
    }

    #[test]
    fn test_scored_boxes_keep_neighbours() {
        // Centres 300px apart: the plate rule would merge these
        let output = tensor(&[
            (0.35, 0.5, 0.2, 0.3, 0.9),
            (0.65, 0.5, 0.2, 0.3, 0.9),
            (0.5, 0.5, 0.2, 0.3, f32::NAN),
        ]);
        let boxes = scored_boxes(output.view().into_dyn(), 0.5, 1000, 1000);
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn test_iou() {
        let a = PixelRect::new(0.0, 0.0, 10.0, 10.0);
        let b = PixelRect::new(5.0, 0.0, 15.0, 10.0);
        let c = PixelRect::new(20.0, 20.0, 30.0, 30.0);

        assert_eq!(iou(&a, &a), 1.0);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(iou(&a, &c), 0.0);
        assert_eq!(iou(&PixelRect::new(1.0, 1.0, 1.0, 1.0), &a), 0.0);
    }

    #[test]
    fn test_nms_keeps_highest_score_of_overlapping_pair() {
        let boxes = vec![
            Detection {
                bounding_box: PixelRect::new(0.0, 0.0, 100.0, 100.0),
                score: 0.6,
            },
            Detection {
                bounding_box: PixelRect::new(5.0, 5.0, 105.0, 105.0),
                score: 0.9,
            },
            Detection {
                bounding_box: PixelRect::new(150.0, 0.0, 250.0, 100.0),
                score: 0.7,
            },
        ];

        let kept = non_max_suppression(boxes, 0.4);
        let scores: Vec<f32> = kept.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn test_crop_regions_skip_degenerate() {
        let detections = vec![
            Detection {
                bounding_box: PixelRect::new(10.0, 10.0, 110.0, 50.0),
                score: 0.9,
            },
            Detection {
                bounding_box: PixelRect::new(640.0, 10.0, 640.0, 50.0),
                score: 0.8,
            },
        ];

        let crops = crop_regions(&detections, 640, 480);
        assert_eq!(crops.len(), 1);
        assert_eq!(crops[0].1.width, 100);
        assert_eq!(crops[0].1.height, 40);
    }
}
