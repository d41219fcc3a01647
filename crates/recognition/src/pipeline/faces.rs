/// Face detection, embedding extraction, enrollment and verification
use crate::config::{RecognitionConfig, TensorLayout};
use crate::decoder::{non_max_suppression, scored_boxes};
use crate::face::{
    extract_embedding, Embedding, EnrollmentSession, EnrollmentSet, FaceEmbeddingMatcher,
    FaceVerdict,
};
use crate::model::{detector_input, embedder_input, FaceDetector, TensorModel};
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::{CropRegion, PixelRect};
use image::{DynamicImage, GenericImageView};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// [`FaceDetector`] over a YOLO-format face model.
///
/// Overlapping boxes are merged with IoU non-maximum suppression, so faces
/// standing next to each other are all kept.
pub struct TensorFaceDetector {
    model: Arc<dyn TensorModel>,
    score_threshold: f32,
    iou_threshold: f32,
    input_size: u32,
    layout: TensorLayout,
}

impl TensorFaceDetector {
    pub fn new(model: Arc<dyn TensorModel>, config: &RecognitionConfig) -> Self {
        Self {
            model,
            score_threshold: config.face_score_threshold,
            iou_threshold: config.face_iou_threshold,
            input_size: config.detection_input_size,
            layout: config.tensor_layout,
        }
    }
}

#[async_trait]
impl FaceDetector for TensorFaceDetector {
    async fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<PixelRect>> {
        let (width, height) = image.dimensions();
        let input = detector_input(image, self.input_size, self.layout);
        let model = Arc::clone(&self.model);

        let output = tokio::task::spawn_blocking(move || model.run(input))
            .await
            .context("Face detector task panicked")??;

        let candidates = scored_boxes(output.view(), self.score_threshold, width, height);
        let faces = non_max_suppression(candidates, self.iou_threshold);
        debug!(faces = faces.len(), "Decoded face detector output");

        Ok(faces
            .into_iter()
            .map(|d| d.bounding_box.clamped(width, height))
            .collect())
    }
}

pub struct FacePipeline {
    detector: Arc<dyn FaceDetector>,
    embedder: Arc<dyn TensorModel>,
    matcher: FaceEmbeddingMatcher,
    input_size: u32,
    layout: TensorLayout,
}

impl FacePipeline {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        embedder: Arc<dyn TensorModel>,
        config: &RecognitionConfig,
    ) -> Self {
        Self {
            detector,
            embedder,
            matcher: FaceEmbeddingMatcher::new(config.match_threshold),
            input_size: config.embedding_input_size,
            layout: config.tensor_layout,
        }
    }

    pub fn matcher(&self) -> FaceEmbeddingMatcher {
        self.matcher
    }

    /// One embedding per face found in `frame`, in detector order.
    ///
    /// Boxes are clamped to the frame; faces with no area or a failed
    /// embedding are skipped. Only a detector failure is an error.
    pub async fn embed_faces(&self, frame: &DynamicImage) -> Result<Vec<Embedding>> {
        let (width, height) = frame.dimensions();
        let faces = self.detector.detect_faces(frame).await?;

        let mut embeddings = Vec::with_capacity(faces.len());
        for face in faces {
            let Some(region) = CropRegion::from_rect(&face, width, height) else {
                telemetry::metrics::DEGENERATE_CROPS.inc();
                debug!(bbox = ?face, "Skipping degenerate face box");
                continue;
            };

            let crop = frame.crop_imm(region.x, region.y, region.width, region.height);
            let input = embedder_input(&crop, self.input_size, self.layout);
            let embedder = Arc::clone(&self.embedder);

            let embedding = tokio::task::spawn_blocking(move || {
                embedder
                    .run(input)
                    .and_then(|output| extract_embedding(output.view()))
            })
            .await
            .context("Face embedder task panicked")?;

            match embedding {
                Ok(embedding) => embeddings.push(embedding),
                Err(e) => warn!(bbox = ?face, error = %e, "Skipping face, embedding failed"),
            }
        }

        Ok(embeddings)
    }

    /// Build an enrollment set from captured frames. Every face of every frame
    /// contributes; frames that fail are logged and skipped.
    pub async fn enroll(&self, name: &str, frames: &[DynamicImage]) -> EnrollmentSet {
        let mut session = EnrollmentSession::new(name);

        for (index, frame) in frames.iter().enumerate() {
            match self.embed_faces(frame).await {
                Ok(embeddings) => {
                    debug!(frame = index, faces = embeddings.len(), "Enrollment frame processed");
                    for embedding in embeddings {
                        session.push(embedding);
                    }
                }
                Err(e) => warn!(frame = index, error = %e, "Skipping enrollment frame"),
            }
        }

        session.finish()
    }

    /// Verdict for every face in `photo`, in detector order
    pub async fn verify(
        &self,
        photo: &DynamicImage,
        set: &EnrollmentSet,
    ) -> Result<Vec<FaceVerdict>> {
        let verdicts: Vec<FaceVerdict> = self
            .embed_faces(photo)
            .await?
            .iter()
            .map(|embedding| self.matcher.verify(embedding, set))
            .collect();

        info!(
            identity = %set.name(),
            faces = verdicts.len(),
            matched = verdicts.iter().filter(|v| v.matched).count(),
            "Face verification complete"
        );
        Ok(verdicts)
    }
}
