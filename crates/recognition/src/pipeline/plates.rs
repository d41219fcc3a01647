/// Plate scanning: detector -> crops -> concurrent OCR -> registry validation
///
/// Each crop is recognized in its own task. Tasks report a [`CropOutcome`]
/// over an mpsc channel and a single collector drains them, so the report is
/// built exactly once regardless of completion order.
use crate::config::{RecognitionConfig, TensorLayout};
use crate::decoder::{crop_regions, DetectionDecoder};
use crate::model::{detector_input, TensorModel, TextRecognizer};
use crate::plate::{CropOutcome, PlateTextValidator};
use anyhow::{Context, Result};
use common::{Detection, PlateRegistry};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Aggregated plate findings for one image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlateReport {
    /// Deduplicated detections, clamped to the image
    pub detections: Vec<Detection>,

    /// First registered plate by completion order
    pub registered: Option<String>,

    /// Well-formed unregistered candidates from every crop; empty when a
    /// registered plate was found
    pub unregistered: Vec<String>,
}

impl PlateReport {
    /// Combine per-crop outcomes in the order they completed
    pub fn aggregate(detections: Vec<Detection>, outcomes: Vec<CropOutcome>) -> Self {
        let mut registered = None;
        let mut unregistered = Vec::new();

        for outcome in outcomes {
            if let Some(plate) = outcome.registered {
                registered = Some(plate);
                break;
            }
            unregistered.extend(outcome.unregistered);
        }

        if registered.is_some() {
            unregistered.clear();
        }

        Self {
            detections,
            registered,
            unregistered,
        }
    }

    pub fn has_registered(&self) -> bool {
        self.registered.is_some()
    }

    /// Human-readable summary; empty when nothing was read
    pub fn display_text(&self) -> String {
        if let Some(plate) = &self.registered {
            return format!("REGISTERED:\n{}", plate);
        }

        self.unregistered
            .iter()
            .map(|plate| format!("UNREGISTERED:\n{}\n\n", plate))
            .collect()
    }
}

pub struct PlatePipeline {
    detector: Arc<dyn TensorModel>,
    recognizer: Arc<dyn TextRecognizer>,
    registry: &'static PlateRegistry,
    decoder: DetectionDecoder,
    input_size: u32,
    layout: TensorLayout,
    ocr_upscale: u32,
}

impl PlatePipeline {
    pub fn new(
        detector: Arc<dyn TensorModel>,
        recognizer: Arc<dyn TextRecognizer>,
        registry: &'static PlateRegistry,
        config: &RecognitionConfig,
    ) -> Self {
        Self {
            detector,
            recognizer,
            registry,
            decoder: DetectionDecoder::new(config.score_threshold, config.center_distance_epsilon),
            input_size: config.detection_input_size,
            layout: config.tensor_layout,
            ocr_upscale: config.ocr_upscale,
        }
    }

    /// Run the detector on a blocking thread and decode its output
    pub async fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let (width, height) = image.dimensions();
        let input = detector_input(image, self.input_size, self.layout);
        let detector = Arc::clone(&self.detector);

        let output = tokio::task::spawn_blocking(move || detector.run(input))
            .await
            .context("Plate detector task panicked")?
            .context("Plate detection failed")?;

        Ok(self.decoder.decode(output.view(), width, height))
    }

    pub async fn scan(&self, image: &DynamicImage) -> Result<PlateReport> {
        let (width, height) = image.dimensions();
        let detections = self.detect(image).await?;
        let crops = crop_regions(&detections, width, height);

        let expected = crops.len();
        let (tx, mut rx) = mpsc::channel::<CropOutcome>(expected.max(1));

        for (index, (_, region)) in crops.into_iter().enumerate() {
            let crop = upscale(
                image.crop_imm(region.x, region.y, region.width, region.height),
                self.ocr_upscale,
            );
            let recognizer = Arc::clone(&self.recognizer);
            let registry = self.registry;
            let tx = tx.clone();

            tokio::spawn(async move {
                let outcome = match recognizer.recognize(&crop).await {
                    Ok(lines) => PlateTextValidator::new(registry).evaluate(&lines),
                    Err(e) => {
                        warn!(crop = index, error = %e, "Text recognition failed");
                        telemetry::metrics::OCR_FAILURES.inc();
                        CropOutcome::default()
                    }
                };

                if tx.send(outcome).await.is_err() {
                    debug!(crop = index, "Plate collector closed before outcome was sent");
                }
            });
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(expected);
        while outcomes.len() < expected {
            match rx.recv().await {
                Some(outcome) => outcomes.push(outcome),
                None => {
                    warn!(
                        received = outcomes.len(),
                        expected, "Recognition tasks ended without reporting"
                    );
                    break;
                }
            }
        }

        let report = PlateReport::aggregate(detections, outcomes);
        info!(
            detections = report.detections.len(),
            crops = expected,
            registered = ?report.registered,
            unregistered = report.unregistered.len(),
            "Plate scan complete"
        );
        Ok(report)
    }
}

fn upscale(crop: DynamicImage, factor: u32) -> DynamicImage {
    if factor <= 1 {
        return crop;
    }
    let (width, height) = crop.dimensions();
    match (width.checked_mul(factor), height.checked_mul(factor)) {
        (Some(scaled_width), Some(scaled_height)) => {
            crop.resize_exact(scaled_width, scaled_height, FilterType::Triangle)
        }
        _ => {
            warn!(width, height, factor, "OCR upscale overflows, using crop as is");
            crop
        }
    }
}
