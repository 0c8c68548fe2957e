// Library exports for the road hazard detection service

pub mod core;
pub mod pipeline;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use crate::core::{
    config::Config,
    errors::{CodecError, ConfigError, DetectorError, PipelineError},
    types::{
        DetectionRequest, DetectionResponse, Hazard, HazardCategory, HazardReport,
        MatchedDetection, RawDetection, SensitiveRegion, Severity,
    },
};

pub use crate::pipeline::DetectionPipeline;

pub use crate::services::{FaceDetector, ObjectDetector, OnnxFaceDetector, OnnxObjectDetector};

pub use crate::utils::Metrics;
