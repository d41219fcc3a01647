//! Preview rendering of plate detections.

use common::Detection;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 4;

/// Copy of `image` with a red hollow rectangle around every detection
pub fn annotate(image: &DynamicImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (img_w, img_h) = canvas.dimensions();

    for detection in detections {
        let rect = detection.bounding_box.clamped(img_w, img_h);
        let left = rect.left.round() as i32;
        let top = rect.top.round() as i32;
        let width = rect.width().round() as i64;
        let height = rect.height().round() as i64;

        // Nested 1px outlines, shrinking inwards
        for inset in 0..BOX_THICKNESS as i64 {
            let w = width - 2 * inset;
            let h = height - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let outline =
                Rect::at(left + inset as i32, top + inset as i32).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut canvas, outline, BOX_COLOR);
        }
    }

    canvas
}
