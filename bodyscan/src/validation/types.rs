//! Validation records: corrections, results, outliers and metrics.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::measurement::{Quality, RawMeasurement};

/// Measured field a correction applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementField {
    ShoulderWidth,
    Height,
}

impl MeasurementField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementField::ShoulderWidth => "shoulder_width",
            MeasurementField::Height => "height",
        }
    }

    pub fn get(&self, measurement: &RawMeasurement) -> f64 {
        match self {
            MeasurementField::ShoulderWidth => measurement.shoulder_width_cm,
            MeasurementField::Height => measurement.height_cm,
        }
    }

    fn get_mut<'a>(&self, measurement: &'a mut RawMeasurement) -> &'a mut f64 {
        match self {
            MeasurementField::ShoulderWidth => &mut measurement.shoulder_width_cm,
            MeasurementField::Height => &mut measurement.height_cm,
        }
    }
}

impl fmt::Display for MeasurementField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionKind {
    /// Multiply the field by `value`.
    Scale,
    /// Add `value` to the field.
    Offset,
    /// Multiply the field by `value` to restore body proportions.
    Proportional,
}

impl CorrectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionKind::Scale => "scale",
            CorrectionKind::Offset => "offset",
            CorrectionKind::Proportional => "proportional",
        }
    }
}

impl fmt::Display for CorrectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed change to one field. Pure data until applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementCorrection {
    pub kind: CorrectionKind,
    pub field: MeasurementField,
    pub value: f64,
    pub reason: String,
    pub confidence: f64,
}

impl MeasurementCorrection {
    /// Apply this correction to `measurement` in place.
    pub fn apply_to(&self, measurement: &mut RawMeasurement) {
        let target = self.field.get_mut(measurement);
        match self.kind {
            CorrectionKind::Scale | CorrectionKind::Proportional => *target *= self.value,
            CorrectionKind::Offset => *target += self.value,
        }
    }
}

/// Outcome of one [`AccuracyValidator::validate`](super::AccuracyValidator::validate) pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub confidence: f64,
    pub corrections: Vec<MeasurementCorrection>,
    pub warnings: Vec<String>,
    pub quality: Quality,
    /// Confidence-weighted moving average of recent accepted measurements.
    pub smoothed: Option<RawMeasurement>,
}

/// One validated measurement as retained in the validator's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub measurement: RawMeasurement,
    pub confidence: f64,
    pub quality: Quality,
    /// Whether the measurement passed validation.
    pub accepted: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierSeverity {
    Low,
    Medium,
    High,
}

impl OutlierSeverity {
    /// Grade by the larger of the per-field z-scores.
    pub fn from_z_score(z: f64) -> Self {
        if z > 3.0 {
            OutlierSeverity::High
        } else if z > 2.0 {
            OutlierSeverity::Medium
        } else {
            OutlierSeverity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutlierSeverity::Low => "low",
            OutlierSeverity::Medium => "medium",
            OutlierSeverity::High => "high",
        }
    }
}

impl fmt::Display for OutlierSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outlier {
    /// Position in the history snapshot, oldest first.
    pub index: usize,
    pub entry: HistoryEntry,
    pub reason: String,
    pub severity: OutlierSeverity,
}

/// Aggregate accuracy over the retained history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AccuracyMetrics {
    /// Mean confidence.
    pub average_accuracy: f64,
    pub consistency_score: f64,
    /// Share of entries flagged as outliers.
    pub outlier_rate: f64,
    pub temporal_stability: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_correction_multiplies_its_field() {
        let mut m = RawMeasurement::new(20.0, 170.0, 0.9);
        MeasurementCorrection {
            kind: CorrectionKind::Scale,
            field: MeasurementField::ShoulderWidth,
            value: 1.75,
            reason: "too small".into(),
            confidence: 0.8,
        }
        .apply_to(&mut m);
        assert_eq!(m.shoulder_width_cm, 35.0);
        assert_eq!(m.height_cm, 170.0);
    }

    #[test]
    fn test_offset_correction_adds() {
        let mut m = RawMeasurement::new(40.0, 140.0, 0.9);
        MeasurementCorrection {
            kind: CorrectionKind::Offset,
            field: MeasurementField::Height,
            value: 10.0,
            reason: "offset".into(),
            confidence: 0.8,
        }
        .apply_to(&mut m);
        assert_eq!(m.height_cm, 150.0);
    }

    #[test]
    fn test_outlier_severity_grades() {
        assert_eq!(OutlierSeverity::from_z_score(3.5), OutlierSeverity::High);
        assert_eq!(OutlierSeverity::from_z_score(2.5), OutlierSeverity::Medium);
        assert_eq!(OutlierSeverity::from_z_score(2.0), OutlierSeverity::Low);
    }
}
