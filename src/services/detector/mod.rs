// Detection capabilities consumed by the pipeline.
//
// Both capabilities are injected as read-only trait objects constructed at
// startup, so tests can substitute stubs. The ONNX-backed implementations
// pool sessions because `Session::run` needs exclusive access; the pool is
// the only shared mutable state and is interior to each detector.

use crate::core::config::Config;
use crate::core::errors::{DetectorError, DetectorResult};
use crate::core::types::{RawDetection, SensitiveRegion};
use image::RgbImage;
use ndarray::Array4;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, trace};

mod labels;

pub use labels::COCO_CLASSES;

// Face model input geometry (RFB-320 layout) and its NMS threshold.
const FACE_INPUT_WIDTH: u32 = 320;
const FACE_INPUT_HEIGHT: u32 = 240;
const FACE_IOU_THRESHOLD: f32 = 0.5;

/// Object-detection capability: image -> raw (label, confidence, box) list.
/// Detections below `confidence_floor` are never surfaced.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, image: &RgbImage, confidence_floor: f32) -> DetectorResult<Vec<RawDetection>>;
}

/// Face-detection capability: image -> ordered list of sensitive regions.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> DetectorResult<Vec<SensitiveRegion>>;
}

/// Round-robin pool of ONNX sessions for concurrent inference.
struct SessionPool {
    sessions: Vec<Mutex<Session>>,
    next: AtomicUsize,
}

impl SessionPool {
    fn build(path: &str, size: usize) -> Result<Self, ort::Error> {
        let mut sessions = Vec::with_capacity(size);
        for i in 0..size {
            debug!("Creating session {} of {} for {}", i + 1, size, path);
            sessions.push(Mutex::new(build_session(path)?));
        }
        Ok(Self {
            sessions,
            next: AtomicUsize::new(0),
        })
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut Session) -> T) -> T {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index].lock();
        f(&mut session)
    }
}

fn build_session(path: &str) -> Result<Session, ort::Error> {
    Session::builder()?
        .with_execution_providers([CPUExecutionProvider::default().build()])?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(num_cpus::get())?
        .commit_from_file(path)
}

/// Resize to the model's input geometry and normalize into an NCHW tensor.
fn image_to_tensor(image: &RgbImage, width: u32, height: u32, mean: f32, scale: f32) -> Array4<f32> {
    let resized = image::imageops::resize(
        image,
        width,
        height,
        image::imageops::FilterType::Triangle,
    );

    let mut array = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for y in 0..height as usize {
        for x in 0..width as usize {
            let pixel = resized.get_pixel(x as u32, y as u32);
            array[[0, 0, y, x]] = (pixel[0] as f32 - mean) / scale;
            array[[0, 1, y, x]] = (pixel[1] as f32 - mean) / scale;
            array[[0, 2, y, x]] = (pixel[2] as f32 - mean) / scale;
        }
    }
    array
}

fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

fn nms(detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    if detections.is_empty() {
        return vec![];
    }

    let mut sorted = detections;
    sorted.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    let mut suppressed = vec![false; sorted.len()];

    for i in 0..sorted.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..sorted.len() {
            if !suppressed[j] && calculate_iou(&sorted[i].bbox, &sorted[j].bbox) > iou_threshold {
                suppressed[j] = true;
                trace!("NMS: suppressed detection {} against {}", j, i);
            }
        }
        keep.push(sorted[i].clone());
    }

    debug!("NMS: kept {}/{} detections", keep.len(), suppressed.len());
    keep
}

/// YOLO-layout object detector backed by ONNX Runtime.
///
/// Expects a single `output0` tensor of shape [1, 4 + classes, anchors]
/// holding cx/cy/w/h rows followed by per-class scores.
pub struct OnnxObjectDetector {
    pool: SessionPool,
    target_size: u32,
    iou_threshold: f32,
}

impl OnnxObjectDetector {
    pub fn load(config: &Config) -> DetectorResult<Self> {
        let path = config.detector_model_path();
        let pool_size = num_cpus::get().min(4);
        info!("Loading detection model from {} ({} sessions)", path, pool_size);

        let started = Instant::now();
        let pool = SessionPool::build(path, pool_size).map_err(|source| {
            DetectorError::LoadFailed {
                path: path.to_string(),
                source,
            }
        })?;
        info!(
            "✓ Detection model ready in {:.2}s",
            started.elapsed().as_secs_f64()
        );

        Ok(Self {
            pool,
            target_size: config.target_size(),
            iou_threshold: config.iou_threshold(),
        })
    }
}

impl ObjectDetector for OnnxObjectDetector {
    fn detect(&self, image: &RgbImage, confidence_floor: f32) -> DetectorResult<Vec<RawDetection>> {
        let started = Instant::now();
        let input = image_to_tensor(image, self.target_size, self.target_size, 0.0, 255.0);
        let input_value = Value::from_array(input)?;

        let (shape, data) = self.pool.with_session(|session| -> DetectorResult<_> {
            let outputs = session.run(ort::inputs!["images" => input_value])?;
            let (shape, data) = outputs["output0"].try_extract_tensor::<f32>()?;
            Ok((shape.to_vec(), data.to_vec()))
        })?;

        if shape.len() != 3 || shape[1] <= 4 {
            return Err(DetectorError::MalformedOutput(format!(
                "expected [1, 4 + classes, anchors] output, got {:?}",
                shape
            )));
        }
        let num_attrs = shape[1] as usize;
        let num_anchors = shape[2] as usize;
        let num_classes = num_attrs - 4;

        let scale_x = image.width() as f32 / self.target_size as f32;
        let scale_y = image.height() as f32 / self.target_size as f32;

        let mut detections = Vec::new();
        for anchor in 0..num_anchors {
            let mut best_class = 0;
            let mut best_score = 0.0_f32;
            for class in 0..num_classes {
                let score = data[(4 + class) * num_anchors + anchor];
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }
            if best_score < confidence_floor {
                continue;
            }

            let cx = data[anchor];
            let cy = data[num_anchors + anchor];
            let w = data[2 * num_anchors + anchor];
            let h = data[3 * num_anchors + anchor];

            let label = COCO_CLASSES.get(best_class).copied().unwrap_or("unknown");
            detections.push(RawDetection {
                label: label.to_string(),
                confidence: best_score,
                bbox: [
                    (cx - w / 2.0) * scale_x,
                    (cy - h / 2.0) * scale_y,
                    (cx + w / 2.0) * scale_x,
                    (cy + h / 2.0) * scale_y,
                ],
            });
        }

        let kept = nms(detections, self.iou_threshold);
        debug!(
            "✓ Object detection completed in {:.2}ms: {} detections above floor {:.2}",
            started.elapsed().as_secs_f64() * 1000.0,
            kept.len(),
            confidence_floor
        );
        Ok(kept)
    }
}

/// RFB-320-layout face detector backed by ONNX Runtime.
///
/// Expects `scores` [1, anchors, 2] and normalized `boxes` [1, anchors, 4].
pub struct OnnxFaceDetector {
    pool: SessionPool,
    score_threshold: f32,
}

impl OnnxFaceDetector {
    pub fn load(config: &Config) -> DetectorResult<Self> {
        let path = config.face_model_path();
        info!("Loading face model from {}", path);

        let pool = SessionPool::build(path, 2).map_err(|source| DetectorError::LoadFailed {
            path: path.to_string(),
            source,
        })?;
        info!("✓ Face model ready");

        Ok(Self {
            pool,
            score_threshold: config.face_score_threshold(),
        })
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&self, image: &RgbImage) -> DetectorResult<Vec<SensitiveRegion>> {
        let input = image_to_tensor(image, FACE_INPUT_WIDTH, FACE_INPUT_HEIGHT, 127.0, 128.0);
        let input_value = Value::from_array(input)?;

        let (scores_shape, scores, boxes) =
            self.pool.with_session(|session| -> DetectorResult<_> {
                let outputs = session.run(ort::inputs!["input" => input_value])?;
                let (scores_shape, scores) = outputs["scores"].try_extract_tensor::<f32>()?;
                let (_boxes_shape, boxes) = outputs["boxes"].try_extract_tensor::<f32>()?;
                Ok((scores_shape.to_vec(), scores.to_vec(), boxes.to_vec()))
            })?;

        if scores_shape.len() != 3 || scores_shape[2] != 2 {
            return Err(DetectorError::MalformedOutput(format!(
                "expected [1, anchors, 2] scores, got {:?}",
                scores_shape
            )));
        }
        let num_anchors = scores_shape[1] as usize;

        let width = image.width() as f32;
        let height = image.height() as f32;

        let mut candidates = Vec::new();
        for anchor in 0..num_anchors {
            let score = scores[anchor * 2 + 1];
            if score < self.score_threshold {
                continue;
            }
            candidates.push(RawDetection {
                label: "face".to_string(),
                confidence: score,
                bbox: [
                    (boxes[anchor * 4] * width).clamp(0.0, width),
                    (boxes[anchor * 4 + 1] * height).clamp(0.0, height),
                    (boxes[anchor * 4 + 2] * width).clamp(0.0, width),
                    (boxes[anchor * 4 + 3] * height).clamp(0.0, height),
                ],
            });
        }

        let regions = nms(candidates, FACE_IOU_THRESHOLD)
            .into_iter()
            .filter_map(|face| {
                let [x1, y1, x2, y2] = face.bbox;
                let region = SensitiveRegion {
                    x: x1 as u32,
                    y: y1 as u32,
                    width: (x2 - x1).max(0.0) as u32,
                    height: (y2 - y1).max(0.0) as u32,
                };
                (region.width > 0 && region.height > 0).then_some(region)
            })
            .collect::<Vec<_>>();

        debug!("Face detection found {} regions", regions.len());
        Ok(regions)
    }
}
