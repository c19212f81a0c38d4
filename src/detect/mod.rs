mod backend;
mod backends;
pub mod labels;
mod loader;
mod result;
pub mod yolo;

pub use backend::{DetectorBackend, DetectorSettings};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use loader::load_detector;
pub use result::{BoundingBox, Detection};
