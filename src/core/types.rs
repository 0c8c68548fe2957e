// Wire and domain types for the hazard detection pipeline

use serde::{Deserialize, Serialize};

/// Incoming detection request: one encoded road-scene image plus the
/// location it was captured at. Coordinates are passed through verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionRequest {
    #[serde(rename = "imageBase64")]
    pub image_base64: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Unfiltered object-detector output, produced per inference call and
/// consumed by the classifier.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    /// x1, y1, x2, y2 in source-image pixel coordinates.
    pub bbox: [f32; 4],
}

/// Rectangle flagged for irreversible redaction before any hazard analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensitiveRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Fixed set of road-condition classes. `Other` owns no keywords; it is the
/// fallback when hazards exist but nothing ever set a dominant category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardCategory {
    Pothole,
    Debris,
    Accident,
    Construction,
    Other,
}

impl HazardCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            HazardCategory::Pothole => "pothole",
            HazardCategory::Debris => "debris",
            HazardCategory::Accident => "accident",
            HazardCategory::Construction => "construction",
            HazardCategory::Other => "other",
        }
    }
}

/// A raw detection that passed keyword-based category assignment.
/// Ordering follows the detector's emission order, never re-sorted.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedDetection {
    #[serde(rename = "type")]
    pub category: HazardCategory,
    pub confidence: f32,
    /// Truncated to whole pixels.
    pub bbox: [i32; 4],
    #[serde(rename = "class")]
    pub source_label: String,
}

/// Per-image aggregation of matched detections.
#[derive(Debug, Clone)]
pub struct HazardReport {
    pub detected: bool,
    /// Present iff `detected`.
    pub dominant_category: Option<HazardCategory>,
    pub max_confidence: f32,
    pub matches: Vec<MatchedDetection>,
}

/// Three-tier confidence bucket, only assigned to detected hazards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

/// Hazard summary carried in the response when a hazard was detected.
#[derive(Debug, Clone, Serialize)]
pub struct Hazard {
    #[serde(rename = "type")]
    pub category: HazardCategory,
    pub latitude: f64,
    pub longitude: f64,
    pub severity: Severity,
    pub description: String,
}

/// Response body for `POST /detect`. `hazard` serializes as `null` when no
/// hazard was found; that case is still a 200.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResponse {
    pub detected: bool,
    pub hazard: Option<Hazard>,
    pub confidence: f32,
    pub bounding_boxes: Vec<MatchedDetection>,
}
