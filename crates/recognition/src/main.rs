use anyhow::{bail, Context, Result};
use common::PlateRegistry;
use recognition::{
    annotate, CtcTextRecognizer, FacePipeline, OnnxModel, PlatePipeline, RecognitionConfig,
    TensorFaceDetector,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const USAGE: &str = "usage:
  plate-scan [--annotate <dir>] <image>...
  plate-scan faces <name> <photo> <enroll-image>...";

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = telemetry::init_with_service("plate-scan");

    info!("Starting plate-scan v{}", common::VERSION);

    let config = RecognitionConfig::from_env()?;
    info!(
        "Recognition configuration: provider={}, device={}, layout={:?}",
        config.execution_provider, config.device_id, config.tensor_layout
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("faces") => run_faces(&config, &args[1..]).await,
        Some(_) => run_plates(&config, &args).await,
        None => bail!(USAGE),
    }
}

async fn run_plates(config: &RecognitionConfig, args: &[String]) -> Result<()> {
    let mut annotate_dir: Option<PathBuf> = None;
    let mut images = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--annotate" {
            let dir = iter.next().context("--annotate needs a directory")?;
            annotate_dir = Some(PathBuf::from(dir));
        } else {
            images.push(PathBuf::from(arg));
        }
    }
    if images.is_empty() {
        bail!(USAGE);
    }

    let registry = match &config.registry_path {
        Some(path) => PlateRegistry::load_file(path)?,
        None => PlateRegistry::with_defaults(),
    };
    let registry = PlateRegistry::install(registry)?;

    let detector = Arc::new(OnnxModel::load(
        "plate_detector",
        &config.detection_model_path,
        config,
    )?);
    let ocr_model = Arc::new(OnnxModel::load("plate_ocr", &config.ocr_model_path, config)?);
    let recognizer = Arc::new(CtcTextRecognizer::new(
        ocr_model,
        &config.char_vocab,
        config.ocr_input_width,
        config.ocr_input_height,
    ));
    let pipeline = PlatePipeline::new(detector, recognizer, registry, config);

    if let Some(dir) = &annotate_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    for path in &images {
        let image = open_image(path)?;
        let report = pipeline.scan(&image).await?;

        println!("{}:", path.display());
        println!("{}", report.display_text());

        if let Some(dir) = &annotate_dir {
            let file_name = path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("frame.png"));
            let output_path = dir.join(file_name);
            annotate(&image, &report.detections)
                .save(&output_path)
                .with_context(|| format!("Failed to save {}", output_path.display()))?;
            info!("Wrote annotated image to {}", output_path.display());
        }
    }

    if let Ok(metrics) = telemetry::metrics::encode_metrics() {
        tracing::debug!("{}", metrics);
    }

    Ok(())
}

async fn run_faces(config: &RecognitionConfig, args: &[String]) -> Result<()> {
    let [name, photo, enroll @ ..] = args else {
        bail!(USAGE);
    };
    if enroll.is_empty() {
        bail!(USAGE);
    }

    let detector_model = Arc::new(OnnxModel::load(
        "face_detector",
        &config.face_detection_model_path,
        config,
    )?);
    let embedder = Arc::new(OnnxModel::load(
        "face_embedder",
        &config.embedding_model_path,
        config,
    )?);
    let detector = Arc::new(TensorFaceDetector::new(detector_model, config));
    let pipeline = FacePipeline::new(detector, embedder, config);

    let frames = enroll
        .iter()
        .map(|path| open_image(Path::new(path)))
        .collect::<Result<Vec<_>>>()?;
    let set = pipeline.enroll(name, &frames).await;
    if set.is_empty() {
        bail!("No faces found while enrolling {}", name);
    }

    let verdicts = pipeline.verify(&open_image(Path::new(photo))?, &set).await?;
    if verdicts.is_empty() {
        println!("No faces found in {}", photo);
    }
    for verdict in verdicts {
        match verdict.min_distance {
            Some(distance) => println!("{} (distance {:.3})", verdict.label, distance),
            None => println!("{}", verdict.label),
        }
    }

    Ok(())
}

fn open_image(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).with_context(|| format!("Failed to load image {}", path.display()))
}
