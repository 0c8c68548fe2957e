// Pipeline orchestrator: one request, one pipeline execution.
//
// decode -> face redaction -> object detection -> classification -> response.
// CPU-bound stages run under spawn_blocking so the runtime stays responsive;
// the detector call is the only stage with a deadline. No retries anywhere:
// any stage failure is terminal for the request.

use crate::core::config::Config;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::types::{
    DetectionRequest, DetectionResponse, Hazard, RawDetection, Severity,
};
use crate::services::detector::{FaceDetector, ObjectDetector};
use crate::services::{classify, codec, redact};
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{debug, info};

pub struct DetectionPipeline {
    config: Arc<Config>,
    detector: Option<Arc<dyn ObjectDetector>>,
    face_detector: Arc<dyn FaceDetector>,
}

fn join_error(e: JoinError) -> PipelineError {
    PipelineError::TaskJoinFailed(e.to_string())
}

impl DetectionPipeline {
    pub fn new(
        config: Arc<Config>,
        detector: Option<Arc<dyn ObjectDetector>>,
        face_detector: Arc<dyn FaceDetector>,
    ) -> Self {
        Self {
            config,
            detector,
            face_detector,
        }
    }

    /// Whether the object-detection capability is ready. Surfaced by
    /// `GET /health` as `model_loaded`.
    pub fn model_loaded(&self) -> bool {
        self.detector.is_some()
    }

    pub async fn handle(&self, request: DetectionRequest) -> PipelineResult<DetectionResponse> {
        let started = Instant::now();
        let DetectionRequest {
            image_base64,
            latitude,
            longitude,
        } = request;

        // Readiness check before any image work.
        let detector = self
            .detector
            .clone()
            .ok_or(PipelineError::ModelUnavailable)?;

        let image = tokio::task::spawn_blocking(move || codec::decode_image(&image_base64))
            .await
            .map_err(join_error)??;
        debug!(
            "Decoded image {}x{} in {:.2}ms",
            image.width(),
            image.height(),
            started.elapsed().as_secs_f64() * 1000.0
        );

        let image = self.redact_faces(image).await?;
        let raw_detections = self.detect_objects(detector, image).await?;
        let report = classify::classify(&raw_detections);

        let response = match report.dominant_category {
            Some(category) => {
                let severity = Severity::from_confidence(report.max_confidence);
                DetectionResponse {
                    detected: true,
                    hazard: Some(Hazard {
                        category,
                        latitude,
                        longitude,
                        severity,
                        description: format!("Auto-detected: {}", category.as_str()),
                    }),
                    confidence: report.max_confidence,
                    bounding_boxes: report.matches,
                }
            }
            None => DetectionResponse {
                detected: false,
                hazard: None,
                confidence: 0.0,
                bounding_boxes: Vec::new(),
            },
        };

        info!(
            "Pipeline completed in {:.2}ms: detected={} confidence={:.3}",
            started.elapsed().as_secs_f64() * 1000.0,
            response.detected,
            response.confidence
        );
        Ok(response)
    }

    /// Invoke the face capability once and blur what it reports. Runs before
    /// hazard detection so no downstream stage ever sees identifiable faces.
    async fn redact_faces(&self, image: RgbImage) -> PipelineResult<RgbImage> {
        let face_detector = Arc::clone(&self.face_detector);
        let sigma = self.config.blur_sigma();
        tokio::task::spawn_blocking(move || -> PipelineResult<RgbImage> {
            let regions = face_detector.detect(&image)?;
            Ok(redact::redact(image, &regions, sigma))
        })
        .await
        .map_err(join_error)?
    }

    async fn detect_objects(
        &self,
        detector: Arc<dyn ObjectDetector>,
        image: RgbImage,
    ) -> PipelineResult<Vec<RawDetection>> {
        let floor = self.config.confidence_floor();
        let timeout_seconds = self.config.detection_timeout_seconds();

        let inference = tokio::task::spawn_blocking(move || detector.detect(&image, floor));
        match tokio::time::timeout(Duration::from_secs(timeout_seconds), inference).await {
            Ok(joined) => Ok(joined.map_err(join_error)??),
            Err(_) => Err(PipelineError::DetectionTimeout(timeout_seconds)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{DetectionConfig, ModelConfig, RedactionConfig, ServerConfig};
    use crate::core::errors::DetectorResult;
    use crate::core::types::{HazardCategory, SensitiveRegion};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use image::{ImageFormat, Rgb};
    use parking_lot::Mutex;
    use std::io::Cursor;
    use tracing::Level;

    struct StubObjectDetector {
        detections: Vec<RawDetection>,
        floor_seen: Mutex<Option<f32>>,
    }

    impl StubObjectDetector {
        fn new(detections: Vec<RawDetection>) -> Arc<Self> {
            Arc::new(Self {
                detections,
                floor_seen: Mutex::new(None),
            })
        }
    }

    impl ObjectDetector for StubObjectDetector {
        fn detect(
            &self,
            _image: &RgbImage,
            confidence_floor: f32,
        ) -> DetectorResult<Vec<RawDetection>> {
            *self.floor_seen.lock() = Some(confidence_floor);
            Ok(self.detections.clone())
        }
    }

    struct StubFaceDetector {
        regions: Vec<SensitiveRegion>,
    }

    impl FaceDetector for StubFaceDetector {
        fn detect(&self, _image: &RgbImage) -> DetectorResult<Vec<SensitiveRegion>> {
            Ok(self.regions.clone())
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
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
        })
    }

    fn request_with_image() -> DetectionRequest {
        let img = RgbImage::from_pixel(64, 48, Rgb([90, 90, 90]));
        let mut png_bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
            .unwrap();
        DetectionRequest {
            image_base64: STANDARD.encode(&png_bytes),
            latitude: 37.7749,
            longitude: -122.4194,
        }
    }

    fn pipeline_with(
        detector: Option<Arc<dyn ObjectDetector>>,
        regions: Vec<SensitiveRegion>,
    ) -> DetectionPipeline {
        DetectionPipeline::new(
            test_config(),
            detector,
            Arc::new(StubFaceDetector { regions }),
        )
    }

    fn raw(label: &str, confidence: f32, bbox: [f32; 4]) -> RawDetection {
        RawDetection {
            label: label.to_string(),
            confidence,
            bbox,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_hazard_detection() {
        let detector = StubObjectDetector::new(vec![
            raw("car", 0.8, [10.0, 20.0, 200.0, 220.0]),
            raw("traffic cone", 0.4, [300.0, 40.0, 340.0, 90.0]),
        ]);
        let pipeline = pipeline_with(Some(detector.clone()), vec![]);

        let response = pipeline.handle(request_with_image()).await.unwrap();

        assert!(response.detected);
        assert_eq!(response.confidence, 0.8);
        assert_eq!(response.bounding_boxes.len(), 2);
        assert_eq!(response.bounding_boxes[0].category, HazardCategory::Accident);
        assert_eq!(
            response.bounding_boxes[1].category,
            HazardCategory::Construction
        );

        let hazard = response.hazard.unwrap();
        assert_eq!(hazard.category, HazardCategory::Accident);
        assert_eq!(hazard.severity, Severity::High);
        assert_eq!(hazard.latitude, 37.7749);
        assert_eq!(hazard.longitude, -122.4194);
        assert_eq!(hazard.description, "Auto-detected: accident");

        // The configured floor reaches the external capability verbatim.
        assert_eq!(*detector.floor_seen.lock(), Some(0.25));
    }

    #[tokio::test]
    async fn test_zero_detections_is_a_normal_response() {
        let pipeline = pipeline_with(Some(StubObjectDetector::new(vec![])), vec![]);

        let response = pipeline.handle(request_with_image()).await.unwrap();

        assert!(!response.detected);
        assert!(response.hazard.is_none());
        assert_eq!(response.confidence, 0.0);
        assert!(response.bounding_boxes.is_empty());
    }

    #[tokio::test]
    async fn test_missing_model_fails_before_image_work() {
        let pipeline = pipeline_with(None, vec![]);

        // Payload is garbage; readiness is checked first, so the error must
        // be ModelUnavailable, not a codec failure.
        let request = DetectionRequest {
            image_base64: "!!garbage!!".to_string(),
            latitude: 0.0,
            longitude: 0.0,
        };
        let error = pipeline.handle(request).await.unwrap_err();
        assert!(matches!(error, PipelineError::ModelUnavailable));
    }

    #[tokio::test]
    async fn test_invalid_payload_maps_to_invalid_image() {
        let pipeline = pipeline_with(Some(StubObjectDetector::new(vec![])), vec![]);

        let request = DetectionRequest {
            image_base64: "!!garbage!!".to_string(),
            latitude: 0.0,
            longitude: 0.0,
        };
        let error = pipeline.handle(request).await.unwrap_err();
        assert!(matches!(error, PipelineError::InvalidImage(_)));
    }

    #[tokio::test]
    async fn test_faces_are_redacted_before_detection() {
        let detector = StubObjectDetector::new(vec![]);
        let pipeline = pipeline_with(
            Some(detector),
            vec![SensitiveRegion {
                x: 0,
                y: 0,
                width: 32,
                height: 32,
            }],
        );

        // A face region that covers pattern detail must not fail the
        // request; redaction is a normal stage, not an error path.
        let response = pipeline.handle(request_with_image()).await.unwrap();
        assert!(!response.detected);
    }
}
