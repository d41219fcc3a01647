//! Plate and face recognition post-processing.
//!
//! Re-exports the workspace crates under one name:
//! [`common`] holds the shared vision types and the plate registry,
//! [`recognition`] the decoders, validators, matchers and pipelines, and
//! [`telemetry`] logging and metrics.

pub use common;
pub use recognition;
pub use telemetry;

pub use common::{CropRegion, Detection, OcrLine, PixelRect, PlateRegistry};
pub use recognition::{
    DetectionDecoder, FaceEmbeddingMatcher, FacePipeline, PlatePipeline, PlateReport,
    PlateTextValidator, RecognitionConfig,
};
