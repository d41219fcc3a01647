pub mod registry;
pub mod vision;

pub use registry::PlateRegistry;
pub use vision::{CropRegion, Detection, OcrLine, PixelRect};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
