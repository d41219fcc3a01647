/// Integration tests for face enrollment and verification with scripted models
use anyhow::{bail, Result};
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use lplate_vision::recognition::{
    EnrollmentSet, FaceDetector, TensorModel, EMBEDDING_DIM,
};
use lplate_vision::{FaceEmbeddingMatcher, FacePipeline, PixelRect, RecognitionConfig};
use ndarray::{Array2, ArrayD};

/// Two faces per frame: left half and right half. A frame whose top-left
/// pixel is white is treated as unreadable.
struct HalvesDetector;

#[async_trait]
impl FaceDetector for HalvesDetector {
    async fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<PixelRect>> {
        let rgb = image.to_rgb8();
        if rgb.get_pixel(0, 0) == &Rgb([255, 255, 255]) {
            bail!("detector rejected frame");
        }

        let (w, h) = rgb.dimensions();
        let (w, h) = (w as f32, h as f32);
        Ok(vec![
            PixelRect::new(0.0, 0.0, w / 2.0, h),
            // Overhangs the frame on purpose; clamped before cropping
            PixelRect::new(w / 2.0, -10.0, w + 25.0, h + 10.0),
        ])
    }
}

/// Embedding direction picked by the dominant colour channel of the crop
struct ChannelEmbedder;

impl TensorModel for ChannelEmbedder {
    fn name(&self) -> &str {
        "channel_embedder"
    }

    fn run(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let channel = (0..3)
            .max_by(|&a, &b| input[[0, a, 56, 56]].total_cmp(&input[[0, b, 56, 56]]))
            .unwrap_or(0);
        let mut output = Array2::<f32>::zeros((1, EMBEDDING_DIM));
        output[[0, channel]] = 3.0;
        Ok(output.into_dyn())
    }
}

/// 128x64 frame, left half `left`, right half `right`
fn frame(left: [u8; 3], right: [u8; 3]) -> DynamicImage {
    let img = RgbImage::from_fn(128, 64, |x, _| if x < 64 { Rgb(left) } else { Rgb(right) });
    DynamicImage::ImageRgb8(img)
}

const RED: [u8; 3] = [220, 10, 10];
const GREEN: [u8; 3] = [10, 220, 10];
const BLUE: [u8; 3] = [10, 10, 220];

fn pipeline() -> FacePipeline {
    let config = RecognitionConfig::default();
    FacePipeline::new(
        std::sync::Arc::new(HalvesDetector),
        std::sync::Arc::new(ChannelEmbedder),
        &config,
    )
}

#[tokio::test]
async fn test_enrollment_keeps_every_face_of_every_frame() {
    let pipeline = pipeline();
    let frames = vec![frame(RED, RED), frame(RED, GREEN), frame(RED, RED)];

    let set = pipeline.enroll("alice", &frames).await;

    assert_eq!(set.name(), "alice");
    assert_eq!(set.len(), 6);
    for embedding in set.embeddings() {
        assert!((embedding.norm() - 1.0).abs() < 1e-6);
    }
}

#[tokio::test]
async fn test_failed_frames_are_skipped() {
    let pipeline = pipeline();
    let unreadable = frame([255, 255, 255], RED);

    let set = pipeline.enroll("bob", &[unreadable, frame(RED, RED)]).await;
    assert_eq!(set.len(), 2);
}

#[tokio::test]
async fn test_verify_labels_each_face() {
    let pipeline = pipeline();
    let set = pipeline.enroll("carol", &[frame(RED, RED)]).await;

    let verdicts = pipeline.verify(&frame(RED, BLUE), &set).await.unwrap();

    assert_eq!(verdicts.len(), 2);
    assert!(verdicts[0].matched);
    assert_eq!(verdicts[0].label, "carol");
    assert_eq!(verdicts[0].min_distance, Some(0.0));
    assert!(!verdicts[1].matched);
    assert_eq!(verdicts[1].label, "NOT carol");
}

#[tokio::test]
async fn test_empty_enrollment_never_matches() {
    let pipeline = pipeline();
    let set = EnrollmentSet::new("dave", Vec::new());

    let verdicts = pipeline.verify(&frame(RED, RED), &set).await.unwrap();

    assert_eq!(verdicts.len(), 2);
    assert!(verdicts.iter().all(|v| !v.matched && v.min_distance.is_none()));
    assert!(verdicts.iter().all(|v| v.label == "NOT dave"));
}

#[tokio::test]
async fn test_threshold_comes_from_config() {
    let config = RecognitionConfig {
        match_threshold: 2.0,
        ..RecognitionConfig::default()
    };
    let pipeline = FacePipeline::new(
        std::sync::Arc::new(HalvesDetector),
        std::sync::Arc::new(ChannelEmbedder),
        &config,
    );
    assert_eq!(pipeline.matcher(), FaceEmbeddingMatcher::new(2.0));

    // Orthogonal unit vectors are sqrt(2) apart, below the relaxed threshold
    let set = pipeline.enroll("erin", &[frame(RED, RED)]).await;
    let verdicts = pipeline.verify(&frame(BLUE, BLUE), &set).await.unwrap();
    assert!(verdicts.iter().all(|v| v.matched));
}
