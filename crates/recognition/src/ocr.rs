/// CTC text recognizer for plate crops
///
/// Runs a CRNN-style model over a grayscale crop and greedy-decodes the
/// `[batch, sequence, vocab]` output. Index 0 is the CTC blank, so vocabulary
/// characters start at index 1.
use crate::model::{ocr_input, TensorModel, TextRecognizer};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::{OcrLine, PixelRect};
use image::{DynamicImage, GenericImageView};
use ndarray::{ArrayViewD, Axis, Ix2};
use std::sync::Arc;

pub struct CtcTextRecognizer {
    model: Arc<dyn TensorModel>,
    vocab: Vec<char>,
    input_width: u32,
    input_height: u32,
}

impl CtcTextRecognizer {
    pub fn new(
        model: Arc<dyn TensorModel>,
        char_vocab: &str,
        input_width: u32,
        input_height: u32,
    ) -> Self {
        Self {
            model,
            vocab: char_vocab.chars().collect(),
            input_width,
            input_height,
        }
    }
}

#[async_trait]
impl TextRecognizer for CtcTextRecognizer {
    /// One line covering the whole crop, or nothing when the model reads no text
    async fn recognize(&self, image: &DynamicImage) -> Result<Vec<OcrLine>> {
        let model = Arc::clone(&self.model);
        let vocab = self.vocab.clone();
        let (width, height) = (self.input_width, self.input_height);
        let crop = image.clone();

        let text = tokio::task::spawn_blocking(move || -> Result<String> {
            let output = model.run(ocr_input(&crop, width, height))?;
            ctc_decode(output.view(), &vocab)
        })
        .await
        .context("OCR task panicked")??;

        if text.is_empty() {
            return Ok(Vec::new());
        }

        let (crop_width, crop_height) = image.dimensions();
        let bbox = PixelRect::new(0.0, 0.0, crop_width as f32, crop_height as f32);
        Ok(vec![OcrLine::new(text, Some(bbox))])
    }
}

/// Greedy CTC decode of batch row 0: argmax per step, collapse repeats, drop blanks
pub fn ctc_decode(output: ArrayViewD<'_, f32>, vocab: &[char]) -> Result<String> {
    let steps = match output.ndim() {
        2 => output.into_dimensionality::<Ix2>()?,
        3 if output.shape()[0] > 0 => {
            output.index_axis_move(Axis(0), 0).into_dimensionality::<Ix2>()?
        }
        _ => return Err(anyhow!("Unexpected OCR output shape {:?}", output.shape())),
    };

    let mut text = String::new();
    let mut prev_char_idx = 0;

    for step in steps.rows() {
        let mut max_idx = 0;
        let mut max_prob = f32::NEG_INFINITY;
        for (idx, &prob) in step.iter().enumerate() {
            if prob > max_prob {
                max_prob = prob;
                max_idx = idx;
            }
        }

        if max_idx > 0 && max_idx != prev_char_idx {
            if let Some(&ch) = vocab.get(max_idx - 1) {
                text.push(ch);
            }
        }
        prev_char_idx = max_idx;
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, ArrayD};

    const VOCAB: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-";

    fn vocab() -> Vec<char> {
        VOCAB.chars().collect()
    }

    /// `[1, steps.len(), vocab + 1]` with a one-hot peak per step
    fn one_hot(steps: &[usize]) -> Array3<f32> {
        let mut output = Array3::zeros((1, steps.len(), VOCAB.len() + 1));
        for (t, &idx) in steps.iter().enumerate() {
            output[[0, t, idx]] = 0.9;
        }
        output
    }

    fn index_of(ch: char) -> usize {
        VOCAB.find(ch).map(|i| i + 1).unwrap_or(0)
    }

    #[test]
    fn test_ctc_decode_collapses_repeats_and_blanks() {
        let a = index_of('A');
        let b = index_of('B');
        let output = one_hot(&[0, a, a, 0, a, b, b, 0]);

        let text = ctc_decode(output.view().into_dyn(), &vocab()).unwrap();
        assert_eq!(text, "AAB");
    }

    #[test]
    fn test_ctc_decode_plate() {
        // Blank between every character so the doubled A survives collapsing
        let steps: Vec<usize> = "AA-012-BC"
            .chars()
            .flat_map(|c| [index_of(c), 0])
            .collect();
        let text = ctc_decode(one_hot(&steps).view().into_dyn(), &vocab()).unwrap();
        assert_eq!(text, "AA-012-BC");
    }

    #[test]
    fn test_ctc_decode_all_blank() {
        let output = one_hot(&[0, 0, 0]);
        assert_eq!(ctc_decode(output.view().into_dyn(), &vocab()).unwrap(), "");
    }

    #[test]
    fn test_ctc_decode_rejects_bad_shape() {
        let output = ndarray::Array1::<f32>::zeros(8);
        assert!(ctc_decode(output.view().into_dyn(), &vocab()).is_err());
    }

    struct FixedOutput(Array3<f32>);

    impl TensorModel for FixedOutput {
        fn name(&self) -> &str {
            "fixed_ocr"
        }

        fn run(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>> {
            assert_eq!(input.shape(), &[1, 1, 64, 200]);
            Ok(self.0.clone().into_dyn())
        }
    }

    #[tokio::test]
    async fn test_recognizer_returns_full_crop_line() {
        let steps: Vec<usize> = "DK1234".chars().map(index_of).collect();
        let model = Arc::new(FixedOutput(one_hot(&steps)));
        let recognizer = CtcTextRecognizer::new(model, VOCAB, 200, 64);

        let crop = DynamicImage::new_rgb8(120, 40);
        let lines = recognizer.recognize(&crop).await.unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "DK1234");
        assert_eq!(lines[0].height(), Some(40));
    }

    #[tokio::test]
    async fn test_recognizer_empty_text_yields_no_lines() {
        let model = Arc::new(FixedOutput(one_hot(&[0, 0])));
        let recognizer = CtcTextRecognizer::new(model, VOCAB, 200, 64);
        let lines = recognizer.recognize(&DynamicImage::new_rgb8(50, 20)).await.unwrap();
        assert!(lines.is_empty());
    }
}
