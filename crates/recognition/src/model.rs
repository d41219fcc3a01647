//! Model boundaries and image preprocessing.
//!
//! Inference is consumed as an opaque capability so the decoders and matchers
//! can be driven by synthetic tensors in tests.

use crate::config::TensorLayout;
use anyhow::Result;
use async_trait::async_trait;
use common::{OcrLine, PixelRect};
use image::DynamicImage;
use ndarray::{Array, ArrayD, IxDyn};

/// Tensor-in / tensor-out model
pub trait TensorModel: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &str;

    fn run(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>>;
}

/// Text recognition over a cropped plate image
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &DynamicImage) -> Result<Vec<OcrLine>>;
}

/// Locates faces in a frame; boxes are in frame pixels and may exceed its bounds
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<PixelRect>>;
}

/// Resize to `size` x `size` RGB and map every channel value through `scale`
pub fn image_to_tensor(
    img: &DynamicImage,
    size: u32,
    layout: TensorLayout,
    scale: impl Fn(u8) -> f32,
) -> ArrayD<f32> {
    let resized = img.resize_exact(size, size, image::imageops::FilterType::Triangle);
    let rgb_img = resized.to_rgb8();
    let s = size as usize;

    let mut input = match layout {
        TensorLayout::Nchw => Array::zeros(IxDyn(&[1, 3, s, s])),
        TensorLayout::Nhwc => Array::zeros(IxDyn(&[1, s, s, 3])),
    };

    for (x, y, pixel) in rgb_img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let value = scale(pixel[c]);
            match layout {
                TensorLayout::Nchw => input[[0, c, y, x]] = value,
                TensorLayout::Nhwc => input[[0, y, x, c]] = value,
            }
        }
    }

    input
}

/// Plate detector input: RGB scaled to [0, 1]
pub fn detector_input(img: &DynamicImage, size: u32, layout: TensorLayout) -> ArrayD<f32> {
    image_to_tensor(img, size, layout, |v| v as f32 / 255.0)
}

/// Face embedder input: RGB mapped to roughly [-1, 1] via `(v - 127.5) / 128`
pub fn embedder_input(img: &DynamicImage, size: u32, layout: TensorLayout) -> ArrayD<f32> {
    image_to_tensor(img, size, layout, |v| (v as f32 - 127.5) / 128.0)
}

/// Grayscale OCR input `[1, 1, height, width]` scaled to [0, 1]
pub fn ocr_input(img: &DynamicImage, width: u32, height: u32) -> ArrayD<f32> {
    let resized = img.resize_exact(width, height, image::imageops::FilterType::Triangle);
    let gray_img = resized.to_luma8();

    let mut input = Array::zeros(IxDyn(&[1, 1, height as usize, width as usize]));
    for (x, y, pixel) in gray_img.enumerate_pixels() {
        input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
    }
    input
}
