use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Memory layout of image tensors fed to the models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[batch, channels, height, width]` (ONNX exports)
    Nchw,
    /// `[batch, height, width, channels]` (TFLite-style exports)
    Nhwc,
}

impl Default for TensorLayout {
    fn default() -> Self {
        Self::Nchw
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognitionConfig {
    /// Minimum detector score for a plate candidate (0.0 to 1.0)
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    /// Per-axis pixel distance under which two box centres count as the same plate
    #[serde(default = "default_center_distance_epsilon")]
    pub center_distance_epsilon: f32,

    /// Face match threshold on L2-normalized Euclidean distance (strictly less matches)
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// Plate detector input size (width and height)
    #[serde(default = "default_detection_input_size")]
    pub detection_input_size: u32,

    /// Face embedder input size (width and height)
    #[serde(default = "default_embedding_input_size")]
    pub embedding_input_size: u32,

    #[serde(default)]
    pub tensor_layout: TensorLayout,

    /// Scale factor applied to plate crops before OCR
    #[serde(default = "default_ocr_upscale")]
    pub ocr_upscale: u32,

    /// Path to the plate detection ONNX model
    #[serde(default = "default_detection_model_path")]
    pub detection_model_path: String,

    /// Path to the plate OCR (CRNN/CTC) ONNX model
    #[serde(default = "default_ocr_model_path")]
    pub ocr_model_path: String,

    /// OCR model input width
    #[serde(default = "default_ocr_input_width")]
    pub ocr_input_width: u32,

    /// OCR model input height
    #[serde(default = "default_ocr_input_height")]
    pub ocr_input_height: u32,

    /// OCR vocabulary; CTC blank is index 0, so characters start at index 1
    #[serde(default = "default_char_vocab")]
    pub char_vocab: String,

    /// Path to the face detection ONNX model (YOLO output format)
    #[serde(default = "default_face_detection_model_path")]
    pub face_detection_model_path: String,

    /// Minimum face detector score
    #[serde(default = "default_face_score_threshold")]
    pub face_score_threshold: f32,

    /// Overlap above which the lower-scored face box is suppressed
    #[serde(default = "default_face_iou_threshold")]
    pub face_iou_threshold: f32,

    /// Path to the face embedding ONNX model
    #[serde(default = "default_embedding_model_path")]
    pub embedding_model_path: String,

    /// Plate registry file; built-in plates are used when unset
    #[serde(default)]
    pub registry_path: Option<String>,

    /// Execution provider preference (CPU, CUDA, TensorRT)
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    /// GPU device ID
    #[serde(default)]
    pub device_id: i32,

    /// Number of intra-operation threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Number of inter-operation threads
    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,
}

fn default_score_threshold() -> f32 {
    0.08
}

fn default_center_distance_epsilon() -> f32 {
    400.0
}

fn default_match_threshold() -> f32 {
    0.9
}

fn default_detection_input_size() -> u32 {
    640
}

fn default_embedding_input_size() -> u32 {
    112
}

fn default_ocr_upscale() -> u32 {
    2
}

fn default_detection_model_path() -> String {
    "models/plate_detector.onnx".to_string()
}

fn default_ocr_model_path() -> String {
    "models/plate_ocr.onnx".to_string()
}

fn default_ocr_input_width() -> u32 {
    200
}

fn default_ocr_input_height() -> u32 {
    64
}

fn default_char_vocab() -> String {
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-".to_string()
}

fn default_face_detection_model_path() -> String {
    "models/face_detector.onnx".to_string()
}

fn default_face_score_threshold() -> f32 {
    0.5
}

fn default_face_iou_threshold() -> f32 {
    0.4
}

fn default_embedding_model_path() -> String {
    "models/mobile_face_net.onnx".to_string()
}

fn default_execution_provider() -> String {
    "CPU".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            score_threshold: default_score_threshold(),
            center_distance_epsilon: default_center_distance_epsilon(),
            match_threshold: default_match_threshold(),
            detection_input_size: default_detection_input_size(),
            embedding_input_size: default_embedding_input_size(),
            tensor_layout: TensorLayout::default(),
            ocr_upscale: default_ocr_upscale(),
            detection_model_path: default_detection_model_path(),
            ocr_model_path: default_ocr_model_path(),
            ocr_input_width: default_ocr_input_width(),
            ocr_input_height: default_ocr_input_height(),
            char_vocab: default_char_vocab(),
            face_detection_model_path: default_face_detection_model_path(),
            face_score_threshold: default_face_score_threshold(),
            face_iou_threshold: default_face_iou_threshold(),
            embedding_model_path: default_embedding_model_path(),
            registry_path: None,
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }
}

impl RecognitionConfig {
    /// Read a JSON config file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid recognition config {}", path.display()))
    }

    /// Defaults (or the file named by `RECOGNITION_CONFIG`) overlaid with
    /// `RECOGNITION_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var("RECOGNITION_CONFIG") {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };

        if let Some(value) = env_parse("RECOGNITION_SCORE_THRESHOLD")? {
            config.score_threshold = value;
        }
        if let Some(value) = env_parse("RECOGNITION_CENTER_EPSILON")? {
            config.center_distance_epsilon = value;
        }
        if let Some(value) = env_parse("RECOGNITION_MATCH_THRESHOLD")? {
            config.match_threshold = value;
        }
        if let Ok(path) = env::var("RECOGNITION_DETECTION_MODEL") {
            config.detection_model_path = path;
        }
        if let Ok(path) = env::var("RECOGNITION_OCR_MODEL") {
            config.ocr_model_path = path;
        }
        if let Ok(path) = env::var("RECOGNITION_FACE_DETECTION_MODEL") {
            config.face_detection_model_path = path;
        }
        if let Ok(path) = env::var("RECOGNITION_EMBEDDING_MODEL") {
            config.embedding_model_path = path;
        }
        if let Ok(path) = env::var("RECOGNITION_REGISTRY") {
            config.registry_path = Some(path);
        }
        if let Ok(provider) = env::var("RECOGNITION_EXECUTION_PROVIDER") {
            config.execution_provider = provider;
        }
        if let Some(device_id) = env_parse("RECOGNITION_DEVICE_ID")? {
            config.device_id = device_id;
        }

        Ok(config)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(None),
    }
}
