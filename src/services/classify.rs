// Hazard classification: keyword mapping of raw detections into hazard
// categories, plus the severity policy applied to the aggregate confidence.

use crate::core::types::{
    HazardCategory, HazardReport, MatchedDetection, RawDetection, Severity,
};
use tracing::debug;

/// Ordered category/keyword table. Iterated in this fixed order with first
/// match winning per detection, so a label hitting two categories' keywords
/// is attributed to the earlier category. Process-wide and immutable.
pub const HAZARD_KEYWORDS: &[(HazardCategory, &[&str])] = &[
    (HazardCategory::Pothole, &["hole", "crack", "damage"]),
    (HazardCategory::Debris, &["bottle", "bag", "box", "trash"]),
    (HazardCategory::Accident, &["car", "truck", "person"]),
    (HazardCategory::Construction, &["cone", "barrier", "sign"]),
];

/// First category whose keyword set has a substring hit on the lowercased
/// label, or `None` when the detection is not hazard-relevant.
fn match_category(label: &str) -> Option<HazardCategory> {
    let label = label.to_lowercase();
    for (category, keywords) in HAZARD_KEYWORDS {
        if keywords.iter().any(|keyword| label.contains(keyword)) {
            return Some(*category);
        }
    }
    None
}

/// Aggregate raw detections into a per-image hazard report.
///
/// Unmatched detections are dropped entirely. The dominant category tracks
/// the running maximum confidence with a strictly-greater update, so the
/// first detection seen with the highest confidence wins ties. The `Other`
/// fallback fires only when a hazard was matched but never updated the
/// running maximum; with the strict-greater rule starting from 0.0 that
/// takes a zero-confidence match.
pub fn classify(raw_detections: &[RawDetection]) -> HazardReport {
    let mut matches = Vec::new();
    let mut max_confidence = 0.0_f32;
    let mut dominant = None;

    for detection in raw_detections {
        let Some(category) = match_category(&detection.label) else {
            continue;
        };

        if detection.confidence > max_confidence {
            max_confidence = detection.confidence;
            dominant = Some(category);
        }

        matches.push(MatchedDetection {
            category,
            confidence: detection.confidence,
            bbox: [
                detection.bbox[0] as i32,
                detection.bbox[1] as i32,
                detection.bbox[2] as i32,
                detection.bbox[3] as i32,
            ],
            source_label: detection.label.clone(),
        });
    }

    let detected = !matches.is_empty();
    debug!(
        "Classified {} raw detections: {} matched, max confidence {:.3}",
        raw_detections.len(),
        matches.len(),
        max_confidence
    );

    HazardReport {
        detected,
        dominant_category: detected.then(|| dominant.unwrap_or(HazardCategory::Other)),
        max_confidence,
        matches,
    }
}

impl Severity {
    /// Severity policy: strictly above 0.7 is high, strictly above 0.5 is
    /// medium, otherwise low. Exactly 0.7 is medium; exactly 0.5 is low.
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence > 0.7 {
            Severity::High
        } else if confidence > 0.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}
