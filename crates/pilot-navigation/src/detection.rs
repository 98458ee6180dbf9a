//! Ingestion boundary for detector output.
//!
//! Detectors have used two spellings for the class and box keys over time.
//! [`RawDetection`] accepts both and [`Detection`] is the single normalised
//! form the rest of the crate works with.

use std::fmt;

use pilot_geometry::{Aabb, Point2};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::NavigationError;

/// Confidence threshold used by the detector loop.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

fn default_confidence() -> f32 {
    1.0
}

/// A detection record exactly as the detector emits it, in screen space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Class label.
    #[serde(rename = "class_name", alias = "class")]
    pub class_name: String,
    /// Box corners `(x1, y1, x2, y2)`, any order.
    #[serde(alias = "box")]
    pub bbox: [f64; 4],
    /// Detector confidence; absent means certain.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

/// Object classes the core distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DetectionClass {
    /// The player marker.
    Player,
    /// Teleport portal (minimap or in-game).
    Portal,
    /// Rope, ladder or any other climbable object.
    Rope,
    /// Standable platform.
    Platform,
    /// Solid obstacle or wall.
    Obstacle,
    /// Monster; tracked by the index but never collides.
    Monster,
    /// Any label the core has no use for.
    Other(String),
}

impl DetectionClass {
    /// Maps a detector label to its class.
    pub fn from_label(label: &str) -> Self {
        match label {
            "minimap_player" | "player" => DetectionClass::Player,
            "minimap_portal" | "game_portal" | "portal" => DetectionClass::Portal,
            "climbable_object" | "rope" | "ladder" => DetectionClass::Rope,
            "platform" => DetectionClass::Platform,
            "obstacle" | "wall" => DetectionClass::Obstacle,
            "monster" => DetectionClass::Monster,
            other => DetectionClass::Other(other.to_string()),
        }
    }

    /// Canonical label.
    pub fn as_str(&self) -> &str {
        match self {
            DetectionClass::Player => "player",
            DetectionClass::Portal => "portal",
            DetectionClass::Rope => "rope",
            DetectionClass::Platform => "platform",
            DetectionClass::Obstacle => "obstacle",
            DetectionClass::Monster => "monster",
            DetectionClass::Other(label) => label,
        }
    }
}

impl fmt::Display for DetectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated detection in screen space.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Normalised class.
    pub class: DetectionClass,
    /// Screen-space box with ordered corners.
    pub bbox: Aabb,
    /// Detector confidence.
    pub confidence: f32,
}

impl Detection {
    /// Creates a detection from an already normalised box.
    pub fn new(class: DetectionClass, bbox: Aabb, confidence: f32) -> Self {
        Self { class, bbox, confidence }
    }

    /// Screen-space center of the box.
    pub fn center(&self) -> Point2 {
        self.bbox.center()
    }
}

impl TryFrom<RawDetection> for Detection {
    type Error = NavigationError;

    fn try_from(raw: RawDetection) -> Result<Self, Self::Error> {
        let [x1, y1, x2, y2] = raw.bbox;
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(NavigationError::InvalidDetection(format!(
                "non-finite box for '{}'",
                raw.class_name
            )));
        }
        if !raw.confidence.is_finite() {
            return Err(NavigationError::InvalidDetection(format!(
                "non-finite confidence for '{}'",
                raw.class_name
            )));
        }
        Ok(Detection {
            class: DetectionClass::from_label(&raw.class_name),
            bbox: Aabb::from_corners(Point2::new(x1, y1), Point2::new(x2, y2)),
            confidence: raw.confidence,
        })
    }
}

/// Normalises a batch of raw records, dropping malformed ones and those at
/// or below `min_confidence`. Dropped records are logged, never fatal.
pub fn normalize_detections<I>(raw: I, min_confidence: f32) -> Vec<Detection>
where
    I: IntoIterator<Item = RawDetection>,
{
    raw.into_iter()
        .filter_map(|record| match Detection::try_from(record) {
            Ok(detection) if detection.confidence > min_confidence => Some(detection),
            Ok(detection) => {
                trace!(class = %detection.class, confidence = detection.confidence, "low-confidence detection skipped");
                None
            }
            Err(e) => {
                warn!(error = %e, "Skipping malformed detection");
                None
            }
        })
        .collect()
}
