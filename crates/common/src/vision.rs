//! Shared vision data model for the recognition pipelines.
//!
//! Detection boxes live in the pixel space of the *original* image; crops are
//! integer regions that are guaranteed to be non-degenerate.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates (left, top, right, bottom)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl PixelRect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Centre point of the rectangle
    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// Clamp every edge into `[0, width] x [0, height]`.
    ///
    /// `f32::max`/`f32::min` discard NaN operands, so a NaN edge collapses onto
    /// the image border instead of propagating.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self {
            left: self.left.max(0.0).min(w),
            top: self.top.max(0.0).min(h),
            right: self.right.max(0.0).min(w),
            bottom: self.bottom.max(0.0).min(h),
        }
    }
}

/// A scored bounding box produced by the detection decoder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box in original-image pixels
    pub bounding_box: PixelRect,

    /// Detector confidence (0.0 to 1.0)
    pub score: f32,
}

/// Integer crop region inside an image, always with positive extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Clamp `rect` to the image and truncate to whole pixels.
    ///
    /// Returns `None` for boxes that end up with zero or negative width or
    /// height; those must never be cropped.
    pub fn from_rect(rect: &PixelRect, image_width: u32, image_height: u32) -> Option<Self> {
        let left = rect.left.max(0.0) as i64;
        let top = rect.top.max(0.0) as i64;
        let right = (rect.right as i64).min(image_width as i64);
        let bottom = (rect.bottom as i64).min(image_height as i64);

        let width = right - left;
        let height = bottom - top;
        if width <= 0 || height <= 0 {
            return None;
        }

        Some(Self {
            x: left as u32,
            y: top as u32,
            width: width as u32,
            height: height as u32,
        })
    }
}

/// One line of text returned by the OCR collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    /// Raw recognized text
    pub text: String,

    /// Pixel bounding box of the line, when the recognizer reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<PixelRect>,
}

impl OcrLine {
    pub fn new(text: impl Into<String>, bounding_box: Option<PixelRect>) -> Self {
        Self {
            text: text.into(),
            bounding_box,
        }
    }

    /// Line with a box of the given pixel height anchored at the origin
    pub fn with_height(text: impl Into<String>, height: u32) -> Self {
        Self::new(text, Some(PixelRect::new(0.0, 0.0, 0.0, height as f32)))
    }

    /// Whole-pixel height of the bounding box, if any
    pub fn height(&self) -> Option<i64> {
        self.bounding_box
            .map(|b| b.bottom as i64 - b.top as i64)
    }
}
