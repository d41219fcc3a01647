//! Orchestration of the detection, recognition and matching stages.

pub mod faces;
pub mod plates;

pub use faces::{FacePipeline, TensorFaceDetector};
pub use plates::{PlatePipeline, PlateReport};
