//! Measurement records shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Four-level quality grade used by detection, validation and calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl Quality {
    /// Numeric score used when averaging grades (4 = excellent, 1 = poor).
    pub fn score(&self) -> f64 {
        match self {
            Quality::Excellent => 4.0,
            Quality::Good => 3.0,
            Quality::Fair => 2.0,
            Quality::Poor => 1.0,
        }
    }

    /// Grade an averaged score back onto the scale.
    pub fn from_average_score(score: f64) -> Self {
        if score >= 3.5 {
            Quality::Excellent
        } else if score >= 2.5 {
            Quality::Good
        } else if score >= 1.5 {
            Quality::Fair
        } else {
            Quality::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Excellent => "excellent",
            Quality::Good => "good",
            Quality::Fair => "fair",
            Quality::Poor => "poor",
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurement derived from a single set of landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawMeasurement {
    pub shoulder_width_cm: f64,
    pub height_cm: f64,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl RawMeasurement {
    pub fn new(shoulder_width_cm: f64, height_cm: f64, confidence: f64) -> Self {
        Self {
            shoulder_width_cm,
            height_cm,
            confidence,
            timestamp: Utc::now(),
        }
    }

    /// Height to shoulder-width ratio, or `None` for a zero width.
    pub fn height_to_shoulder_ratio(&self) -> Option<f64> {
        (self.shoulder_width_cm > 0.0).then(|| self.height_cm / self.shoulder_width_cm)
    }
}

/// Final, calibrated record handed to the order flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedMeasurement {
    pub height_cm: f64,
    pub shoulder_width_cm: f64,
    pub chest_cm: f64,
    pub waist_cm: f64,
    pub hips_cm: f64,
    pub confidence: f64,
    /// Whether a user calibration profile was applied.
    pub calibration_applied: bool,
    pub quality: Quality,
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
