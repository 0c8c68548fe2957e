use crate::core::errors::ConfigError;
use std::env;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Model file locations
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub detector_model_path: String,
    pub face_model_path: String,
}

/// Detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Detections below this confidence are never surfaced by the detector.
    pub confidence_floor: f32,
    pub iou_threshold: f32,
    pub target_size: u32,
    /// Deadline around the detector call, in seconds.
    pub timeout_seconds: u64,
}

/// Privacy redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    /// Gaussian sigma for face blurring. Must stay large enough that
    /// identity cannot be recovered from the blurred region.
    pub blur_sigma: f32,
    pub face_score_threshold: f32,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub models: ModelConfig,
    pub detection: DetectionConfig,
    pub redaction: RedactionConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        // Parse log level
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Ok(Self {
            server: ServerConfig {
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8001),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
            },
            models: ModelConfig {
                detector_model_path: env::var("DETECTOR_MODEL_PATH")
                    .unwrap_or_else(|_| "models/yolov8n.onnx".to_string()),
                face_model_path: env::var("FACE_MODEL_PATH")
                    .unwrap_or_else(|_| "models/face-rfb-320.onnx".to_string()),
            },
            detection: DetectionConfig {
                confidence_floor: env::var("CONFIDENCE_FLOOR")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.25),
                iou_threshold: env::var("IOU_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.45),
                target_size: env::var("TARGET_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(640),
                timeout_seconds: env::var("DETECTION_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            redaction: RedactionConfig {
                blur_sigma: env::var("BLUR_SIGMA")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30.0),
                face_score_threshold: env::var("FACE_SCORE_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.7),
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.detection.confidence_floor) {
            return Err(ConfigError::InvalidConfidenceFloor(
                self.detection.confidence_floor,
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.iou_threshold) {
            return Err(ConfigError::InvalidIoUThreshold(
                self.detection.iou_threshold,
            ));
        }

        if !(0.0..=1.0).contains(&self.redaction.face_score_threshold) {
            return Err(ConfigError::InvalidFaceScoreThreshold(
                self.redaction.face_score_threshold,
            ));
        }

        if !(320..=2048).contains(&self.detection.target_size) {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "target_size must be between 320 and 2048, got {}",
                self.detection.target_size
            )));
        }

        if self.detection.timeout_seconds == 0 {
            return Err(ConfigError::InvalidDetectionConfig(
                "detection_timeout_seconds must be > 0".to_string(),
            ));
        }

        if self.redaction.blur_sigma <= 0.0 {
            return Err(ConfigError::InvalidRedactionConfig(format!(
                "blur_sigma must be > 0, got {}",
                self.redaction.blur_sigma
            )));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn detector_model_path(&self) -> &str {
        &self.models.detector_model_path
    }

    pub fn face_model_path(&self) -> &str {
        &self.models.face_model_path
    }

    pub fn confidence_floor(&self) -> f32 {
        self.detection.confidence_floor
    }

    pub fn iou_threshold(&self) -> f32 {
        self.detection.iou_threshold
    }

    pub fn target_size(&self) -> u32 {
        self.detection.target_size
    }

    pub fn detection_timeout_seconds(&self) -> u64 {
        self.detection.timeout_seconds
    }

    pub fn blur_sigma(&self) -> f32 {
        self.redaction.blur_sigma
    }

    pub fn face_score_threshold(&self) -> f32 {
        self.redaction.face_score_threshold
    }
}

// Note: No Default implementation because Config::new() can fail
// Users should explicitly call Config::new()? and handle errors

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                port: 8001,
                host: "127.0.0.1".to_string(),
                log_level: Level::INFO,
            },
            models: ModelConfig {
                detector_model_path: "models/yolov8n.onnx".to_string(),
                face_model_path: "models/face-rfb-320.onnx".to_string(),
            },
            detection: DetectionConfig {
                confidence_floor: 0.25,
                iou_threshold: 0.45,
                target_size: 640,
                timeout_seconds: 30,
            },
            redaction: RedactionConfig {
                blur_sigma: 30.0,
                face_score_threshold: 0.7,
            },
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_confidence_floor() {
        let mut config = base_config();
        config.detection.confidence_floor = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfidenceFloor(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_blur_sigma() {
        let mut config = base_config();
        config.redaction.blur_sigma = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRedactionConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = base_config();
        config.detection.timeout_seconds = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDetectionConfig(_))
        ));
    }
}
