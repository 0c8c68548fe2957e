pub mod classify;
pub mod codec;
pub mod detector;
pub mod redact;

// Re-export commonly used services
pub use detector::{FaceDetector, ObjectDetector, OnnxFaceDetector, OnnxObjectDetector};
