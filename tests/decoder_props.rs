//! Property-based tests for detector output decoding.
//!
//! Random `[5, N]` tensors, including NaN scores and boxes spilling past the
//! frame, must always decode into clamped, above-threshold, well-separated
//! detections.

use lplate_vision::recognition::crop_regions;
use lplate_vision::DetectionDecoder;
use ndarray::Array2;
use proptest::prelude::*;

fn score() -> impl Strategy<Value = f32> {
    prop_oneof![
        8 => 0.0f32..1.0,
        1 => Just(f32::NAN),
    ]
}

fn candidate() -> impl Strategy<Value = (f32, f32, f32, f32, f32)> {
    (-0.2f32..1.2, -0.2f32..1.2, 0.0f32..0.6, 0.0f32..0.6, score())
}

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

proptest! {
    #[test]
    fn decoded_scores_meet_threshold(
        boxes in prop::collection::vec(candidate(), 0..40),
        threshold in 0.0f32..1.0,
    ) {
        let decoder = DetectionDecoder::new(threshold, 50.0);
        let detections = decoder.decode(tensor(&boxes).view().into_dyn(), 640, 480);

        for detection in &detections {
            prop_assert!(detection.score >= threshold);
        }
    }

    #[test]
    fn decoded_boxes_stay_inside_image(
        boxes in prop::collection::vec(candidate(), 0..40),
        width in 1u32..2000,
        height in 1u32..2000,
    ) {
        let detections = DetectionDecoder::default()
            .decode(tensor(&boxes).view().into_dyn(), width, height);

        for detection in &detections {
            let rect = detection.bounding_box;
            prop_assert!(rect.left >= 0.0 && rect.right <= width as f32);
            prop_assert!(rect.top >= 0.0 && rect.bottom <= height as f32);
        }

        for (_, region) in crop_regions(&detections, width, height) {
            prop_assert!(region.width > 0 && region.height > 0);
            prop_assert!(region.x + region.width <= width);
            prop_assert!(region.y + region.height <= height);
        }
    }

    #[test]
    fn decoded_count_never_exceeds_candidates(
        boxes in prop::collection::vec(candidate(), 0..40),
    ) {
        let detections = DetectionDecoder::default()
            .decode(tensor(&boxes).view().into_dyn(), 1280, 720);

        let passing = boxes.iter().filter(|b| b.4 >= 0.08).count();
        prop_assert!(detections.len() <= passing);
    }

    #[test]
    fn first_candidate_always_survives(
        first in (0.0f32..1.0, 0.0f32..1.0, 0.01f32..0.5, 0.01f32..0.5, 0.5f32..1.0),
        rest in prop::collection::vec(candidate(), 0..20),
    ) {
        let mut boxes = vec![first];
        boxes.extend(rest);

        let detections = DetectionDecoder::default()
            .decode(tensor(&boxes).view().into_dyn(), 1000, 1000);

        prop_assert!(!detections.is_empty());
        prop_assert_eq!(detections[0].score, first.4);
    }
}
