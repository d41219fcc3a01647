pub mod annotate;
pub mod config;
pub mod decoder;
pub mod face;
pub mod model;
pub mod ocr;
pub mod onnx;
pub mod pipeline;
pub mod plate;

pub use annotate::annotate;
pub use config::{RecognitionConfig, TensorLayout};
pub use decoder::{crop_regions, DetectionDecoder};
pub use face::{
    extract_embedding, Embedding, EnrollmentSession, EnrollmentSet, FaceEmbeddingMatcher,
    FaceVerdict, EMBEDDING_DIM,
};
pub use model::{FaceDetector, TensorModel, TextRecognizer};
pub use ocr::CtcTextRecognizer;
pub use onnx::OnnxModel;
pub use pipeline::{FacePipeline, PlatePipeline, PlateReport, TensorFaceDetector};
pub use plate::{select_candidates, validate, CropOutcome, PlateTextValidator};
