pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{CodecError, ConfigError, DetectorError, PipelineError};
pub use types::{
    DetectionRequest, DetectionResponse, Hazard, HazardCategory, HazardReport, MatchedDetection,
    RawDetection, SensitiveRegion, Severity,
};
