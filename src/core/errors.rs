// Custom error types for better error handling and debugging
//
// Using thiserror for ergonomic error definitions with:
// - Type-safe error matching at the HTTP boundary
// - Automatic Display/Error trait implementations
// - Source error chaining

use thiserror::Error;

/// Image codec errors. Every variant is a client fault and maps to 400.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty image payload")]
    EmptyPayload,

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("undecodable image: {0}")]
    UndecodableImage(#[from] image::ImageError),
}

/// Detector capability errors (object and face detection share these).
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("model load failed for {path}: {source}")]
    LoadFailed {
        path: String,
        #[source]
        source: ort::Error,
    },

    #[error("ONNX inference failed: {0}")]
    InferenceFailed(#[from] ort::Error),

    #[error("unexpected model output: {0}")]
    MalformedOutput(String),
}

/// Pipeline orchestration errors, mapped once at the HTTP boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] CodecError),

    #[error("detection model not loaded")]
    ModelUnavailable,

    #[error("detection timed out after {0}s")]
    DetectionTimeout(u64),

    #[error("detector failure: {0}")]
    Detector(#[from] DetectorError),

    #[error("task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("confidence floor must be in [0.0, 1.0], got {0}")]
    InvalidConfidenceFloor(f32),

    #[error("IoU threshold must be in [0.0, 1.0], got {0}")]
    InvalidIoUThreshold(f32),

    #[error("face score threshold must be in [0.0, 1.0], got {0}")]
    InvalidFaceScoreThreshold(f32),

    #[error("invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("invalid redaction config: {0}")]
    InvalidRedactionConfig(String),
}

// Convenience type aliases for Results
pub type CodecResult<T> = Result<T, CodecError>;
pub type DetectorResult<T> = Result<T, DetectorError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
