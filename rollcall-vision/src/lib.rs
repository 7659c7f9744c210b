pub mod analyzer;
pub mod face;
pub mod sidecar;

// Re-export commonly used types
pub use analyzer::FaceAnalyzer;
pub use face::{Detection, Embedding};
pub use sidecar::SidecarAnalyzer;
