//! Landmark to measurement extraction.

use super::types::RawMeasurement;
use crate::detection::{BodyLandmarks, LandmarkKind};

/// Settings for turning landmarks into centimetres.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Centimetres per landmark coordinate unit (landmarks are in metres).
    pub cm_per_unit: f64,
    /// Nose-to-ankle span times this factor approximates full height.
    pub crown_factor: f64,
    /// Landmarks below this confidence count as not visible.
    pub visibility_threshold: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            cm_per_unit: 100.0,
            crown_factor: 1.07,
            visibility_threshold: 0.5,
        }
    }
}

/// Derives raw shoulder width and height from a landmark set.
#[derive(Debug, Clone, Default)]
pub struct MeasurementExtractor {
    config: ExtractionConfig,
}

impl MeasurementExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract a measurement, or `None` when the landmarks are degenerate
    /// (zero shoulder span or zero height).
    ///
    /// Confidence combines how many landmarks are visible with how sure the
    /// tracker was about them on average.
    pub fn extract(&self, landmarks: &BodyLandmarks) -> Option<RawMeasurement> {
        let left_shoulder = landmarks.get(LandmarkKind::LeftShoulder);
        let right_shoulder = landmarks.get(LandmarkKind::RightShoulder);
        let shoulder_width_cm = left_shoulder.distance_to(right_shoulder) * self.config.cm_per_unit;

        let nose = landmarks.get(LandmarkKind::Nose);
        let ankles = landmarks
            .get(LandmarkKind::LeftAnkle)
            .midpoint(landmarks.get(LandmarkKind::RightAnkle));
        let height_cm = (ankles.y - nose.y).abs() * self.config.crown_factor * self.config.cm_per_unit;

        if shoulder_width_cm <= 0.0 || height_cm <= 0.0 {
            tracing::debug!("Degenerate landmarks, no measurement extracted");
            return None;
        }

        let confidence = landmarks.visibility_ratio(self.config.visibility_threshold)
            * landmarks.mean_confidence();

        Some(RawMeasurement::new(
            shoulder_width_cm,
            height_cm,
            confidence.clamp(0.0, 1.0),
        ))
    }
}

/// Circumference estimates derived from height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProportionalEstimate {
    pub chest_cm: f64,
    pub waist_cm: f64,
    pub hips_cm: f64,
}

impl ProportionalEstimate {
    pub const CHEST_RATIO: f64 = 0.56;
    pub const WAIST_RATIO: f64 = 0.47;
    pub const HIPS_RATIO: f64 = 0.52;

    pub fn from_height(height_cm: f64) -> Self {
        Self {
            chest_cm: height_cm * Self::CHEST_RATIO,
            waist_cm: height_cm * Self::WAIST_RATIO,
            hips_cm: height_cm * Self::HIPS_RATIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BoundingBox, Landmark};

    fn standing_person(shoulder_m: f64, nose_to_ankle_m: f64, confidence: f64) -> BodyLandmarks {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let mut landmarks = BodyLandmarks::from_template(&bbox, 1.0, confidence, confidence);
        landmarks.set(
            LandmarkKind::LeftShoulder,
            Landmark::new(-shoulder_m / 2.0, 0.3, 2.0, confidence),
        );
        landmarks.set(
            LandmarkKind::RightShoulder,
            Landmark::new(shoulder_m / 2.0, 0.3, 2.0, confidence),
        );
        landmarks.set(LandmarkKind::Nose, Landmark::new(0.0, 0.1, 2.0, confidence));
        landmarks.set(
            LandmarkKind::LeftAnkle,
            Landmark::new(-0.1, 0.1 + nose_to_ankle_m, 2.0, confidence),
        );
        landmarks.set(
            LandmarkKind::RightAnkle,
            Landmark::new(0.1, 0.1 + nose_to_ankle_m, 2.0, confidence),
        );
        landmarks
    }

    #[test]
    fn test_extracts_centimetres() {
        let extractor = MeasurementExtractor::default();
        let m = extractor.extract(&standing_person(0.42, 1.6, 0.9)).unwrap();
        assert!((m.shoulder_width_cm - 42.0).abs() < 1e-9);
        assert!((m.height_cm - 171.2).abs() < 1e-9);
        assert!((m.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_low_visibility_reduces_confidence() {
        let extractor = MeasurementExtractor::default();
        let m = extractor.extract(&standing_person(0.42, 1.6, 0.4)).unwrap();
        assert_eq!(m.confidence, 0.0);
    }

    #[test]
    fn test_degenerate_landmarks() {
        let extractor = MeasurementExtractor::default();
        assert!(extractor.extract(&standing_person(0.0, 1.6, 0.9)).is_none());
    }

    #[test]
    fn test_proportional_estimate() {
        let estimate = ProportionalEstimate::from_height(100.0);
        assert!((estimate.chest_cm - 56.0).abs() < 1e-9);
        assert!((estimate.waist_cm - 47.0).abs() < 1e-9);
        assert!((estimate.hips_cm - 52.0).abs() < 1e-9);
    }
}
