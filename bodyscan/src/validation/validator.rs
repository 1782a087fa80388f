//! Measurement validation and correction.

use chrono::Utc;
use parking_lot::Mutex;

use super::types::{
    AccuracyMetrics, CorrectionKind, HistoryEntry, MeasurementCorrection, MeasurementField,
    Outlier, OutlierSeverity, ValidationResult,
};
use crate::history::BoundedHistory;
use crate::measurement::{Quality, RawMeasurement};

/// Confidence attached to range corrections.
const RANGE_CORRECTION_CONFIDENCE: f64 = 0.8;

/// Confidence attached to proportional corrections.
const PROPORTIONAL_CORRECTION_CONFIDENCE: f64 = 0.7;

/// Entries required before outlier statistics mean anything.
const MIN_OUTLIER_SAMPLES: usize = 3;

/// Relative change per step below which a series counts as stable.
const STABLE_TREND: f64 = 0.1;

/// Inclusive range of anatomically plausible values, in centimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibleRange {
    pub min: f64,
    pub max: f64,
}

impl PlausibleRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyConfig {
    pub enable_temporal_smoothing: bool,
    pub enable_outlier_detection: bool,
    pub enable_proportional_validation: bool,
    /// Accepted measurements averaged by temporal smoothing.
    pub smoothing_window: usize,
    /// z-score above which a history entry is an outlier.
    pub outlier_threshold: f64,
    pub min_confidence_threshold: f64,
    pub shoulder_width_range: PlausibleRange,
    pub height_range: PlausibleRange,
    /// Expected height / shoulder width ratio.
    pub expected_ratio: f64,
    pub ratio_tolerance: f64,
    pub history_size: usize,
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self {
            enable_temporal_smoothing: true,
            enable_outlier_detection: true,
            enable_proportional_validation: true,
            smoothing_window: 5,
            outlier_threshold: 2.0,
            min_confidence_threshold: 0.6,
            shoulder_width_range: PlausibleRange::new(35.0, 50.0),
            height_range: PlausibleRange::new(150.0, 200.0),
            expected_ratio: 3.5,
            ratio_tolerance: 0.5,
            history_size: 50,
        }
    }
}

struct ValidatorState {
    config: AccuracyConfig,
    history: BoundedHistory<HistoryEntry>,
}

/// Validates raw measurements against plausible ranges and body
/// proportions, and keeps the history used for smoothing and outlier
/// statistics.
///
/// Validation never fails: problems come back as warnings and proposed
/// [`MeasurementCorrection`]s inside the [`ValidationResult`].
pub struct AccuracyValidator {
    state: Mutex<ValidatorState>,
}

impl Default for AccuracyValidator {
    fn default() -> Self {
        Self::new(AccuracyConfig::default())
    }
}

impl AccuracyValidator {
    pub fn new(config: AccuracyConfig) -> Self {
        let history = BoundedHistory::new(config.history_size);
        Self {
            state: Mutex::new(ValidatorState { config, history }),
        }
    }

    pub fn config(&self) -> AccuracyConfig {
        self.state.lock().config.clone()
    }

    /// Replace the configuration. A smaller history size evicts the oldest
    /// entries immediately.
    pub fn update_config(&self, config: AccuracyConfig) {
        let mut state = self.state.lock();
        state.history.set_capacity(config.history_size);
        state.config = config;
    }

    /// Validate one measurement and record it in the history.
    pub fn validate(&self, measurement: &RawMeasurement, confidence: f64) -> ValidationResult {
        let mut state = self.state.lock();
        let config = state.config.clone();

        let mut warnings = Vec::new();
        let mut corrections = Vec::new();
        let mut is_valid = true;

        if confidence < config.min_confidence_threshold {
            warnings.push(format!(
                "Low confidence: {:.2} < {}",
                confidence, config.min_confidence_threshold
            ));
        }

        let mut corrected = *measurement;
        for (field, label, range) in [
            (
                MeasurementField::ShoulderWidth,
                "Shoulder width",
                config.shoulder_width_range,
            ),
            (MeasurementField::Height, "Height", config.height_range),
        ] {
            if let Some(correction) = check_range(field, label, range, &corrected, &mut warnings) {
                is_valid = false;
                correction.apply_to(&mut corrected);
                corrections.push(correction);
            } else if !range.contains(field.get(&corrected)) {
                is_valid = false;
            }
        }

        if config.enable_proportional_validation {
            if let Some(correction) = check_proportions(&config, &corrected, &mut warnings) {
                is_valid = false;
                corrections.push(correction);
            }
        }

        let quality = classify_quality(confidence, warnings.len());

        state.history.push(HistoryEntry {
            measurement: *measurement,
            confidence,
            quality,
            accepted: is_valid,
            recorded_at: Utc::now(),
        });

        let smoothed = if config.enable_temporal_smoothing {
            smooth(&state.history, config.smoothing_window)
        } else {
            None
        };

        tracing::debug!(
            valid = is_valid,
            quality = %quality,
            corrections = corrections.len(),
            warnings = warnings.len(),
            "Measurement validated"
        );

        ValidationResult {
            is_valid,
            confidence,
            corrections,
            warnings,
            quality,
            smoothed,
        }
    }

    /// Apply corrections in order, returning the corrected measurement.
    pub fn apply_corrections(
        &self,
        measurement: &RawMeasurement,
        corrections: &[MeasurementCorrection],
    ) -> RawMeasurement {
        let mut corrected = *measurement;
        for correction in corrections {
            correction.apply_to(&mut corrected);
        }
        corrected
    }

    /// Flag history entries whose shoulder width or height deviates from
    /// the history mean by more than the configured z-score.
    pub fn detect_outliers(&self) -> Vec<Outlier> {
        let state = self.state.lock();
        if !state.config.enable_outlier_detection {
            return Vec::new();
        }
        find_outliers(&state.history.snapshot(), state.config.outlier_threshold)
    }

    pub fn accuracy_metrics(&self) -> AccuracyMetrics {
        let state = self.state.lock();
        let entries = state.history.snapshot();
        if entries.is_empty() {
            return AccuracyMetrics::default();
        }

        let confidences: Vec<f64> = entries.iter().map(|e| e.confidence).collect();
        let outliers = find_outliers(&entries, state.config.outlier_threshold);

        AccuracyMetrics {
            average_accuracy: mean(&confidences),
            consistency_score: consistency(&entries),
            outlier_rate: outliers.len() as f64 / entries.len() as f64,
            temporal_stability: temporal_stability(&entries),
        }
    }

    /// Point-in-time copy of the history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().history.snapshot()
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }
}

fn check_range(
    field: MeasurementField,
    label: &str,
    range: PlausibleRange,
    measurement: &RawMeasurement,
    warnings: &mut Vec<String>,
) -> Option<MeasurementCorrection> {
    let value = field.get(measurement);
    if !value.is_finite() {
        warnings.push(format!("{label} is not a finite value"));
        return None;
    }
    if range.contains(value) {
        return None;
    }

    let (position, bound) = if value < range.min {
        ("below", range.min)
    } else {
        ("above", range.max)
    };
    warnings.push(format!(
        "{label} {value:.1}cm is {position} normal range ({}-{}cm)",
        range.min, range.max
    ));

    let reason = format!("{label} {}", if value < range.min { "too small" } else { "too large" });
    let correction = if value > 0.0 {
        MeasurementCorrection {
            kind: CorrectionKind::Scale,
            field,
            value: bound / value,
            reason,
            confidence: RANGE_CORRECTION_CONFIDENCE,
        }
    } else {
        // No scale factor can lift a non-positive value into range.
        MeasurementCorrection {
            kind: CorrectionKind::Offset,
            field,
            value: bound - value,
            reason,
            confidence: RANGE_CORRECTION_CONFIDENCE,
        }
    };
    Some(correction)
}

/// Check height / shoulder width on range-corrected values and propose one
/// correction that restores the ratio without leaving the plausible ranges.
fn check_proportions(
    config: &AccuracyConfig,
    measurement: &RawMeasurement,
    warnings: &mut Vec<String>,
) -> Option<MeasurementCorrection> {
    let ratio = measurement.height_to_shoulder_ratio()?;
    if !ratio.is_finite() || (ratio - config.expected_ratio).abs() <= config.ratio_tolerance {
        return None;
    }

    warnings.push(format!(
        "Unusual body proportions: ratio {:.2} (expected {} ± {})",
        ratio, config.expected_ratio, config.ratio_tolerance
    ));

    let height = measurement.height_cm;
    let shoulder = measurement.shoulder_width_cm;

    let height_factor = config.expected_ratio / ratio;
    let (field, value) = if config.height_range.contains(height * height_factor) {
        (MeasurementField::Height, height_factor)
    } else {
        let shoulder_factor = ratio / config.expected_ratio;
        if config.shoulder_width_range.contains(shoulder * shoulder_factor) {
            (MeasurementField::ShoulderWidth, shoulder_factor)
        } else {
            let target = config.height_range.clamp(height * height_factor);
            (MeasurementField::Height, target / height)
        }
    };

    Some(MeasurementCorrection {
        kind: CorrectionKind::Proportional,
        field,
        value,
        reason: "Body proportions outside expected range".to_string(),
        confidence: PROPORTIONAL_CORRECTION_CONFIDENCE,
    })
}

fn classify_quality(confidence: f64, warnings: usize) -> Quality {
    if confidence >= 0.9 && warnings == 0 {
        Quality::Excellent
    } else if confidence >= 0.7 && warnings <= 1 {
        Quality::Good
    } else if confidence >= 0.5 && warnings <= 2 {
        Quality::Fair
    } else {
        Quality::Poor
    }
}

/// Confidence-weighted average of the newest `window` accepted entries.
fn smooth(history: &BoundedHistory<HistoryEntry>, window: usize) -> Option<RawMeasurement> {
    let accepted: Vec<&HistoryEntry> = history.iter().rev().filter(|e| e.accepted).take(window).collect();
    let newest = accepted.first()?;

    let total_weight: f64 = accepted.iter().map(|e| e.confidence.max(0.0)).sum();
    if total_weight <= 0.0 {
        return Some(newest.measurement);
    }

    let (mut shoulder, mut height, mut confidence) = (0.0, 0.0, 0.0);
    for entry in &accepted {
        let weight = entry.confidence.max(0.0) / total_weight;
        shoulder += entry.measurement.shoulder_width_cm * weight;
        height += entry.measurement.height_cm * weight;
        confidence += entry.confidence * weight;
    }

    Some(RawMeasurement {
        shoulder_width_cm: shoulder,
        height_cm: height,
        confidence,
        timestamp: newest.measurement.timestamp,
    })
}

fn find_outliers(entries: &[HistoryEntry], threshold: f64) -> Vec<Outlier> {
    if entries.len() < MIN_OUTLIER_SAMPLES {
        return Vec::new();
    }

    let shoulders: Vec<f64> = entries.iter().map(|e| e.measurement.shoulder_width_cm).collect();
    let heights: Vec<f64> = entries.iter().map(|e| e.measurement.height_cm).collect();
    let (shoulder_mean, shoulder_std) = (mean(&shoulders), variance(&shoulders).sqrt());
    let (height_mean, height_std) = (mean(&heights), variance(&heights).sqrt());

    let z = |value: f64, mean: f64, std: f64| {
        if std > 0.0 {
            (value - mean).abs() / std
        } else {
            0.0
        }
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let shoulder_z = z(entry.measurement.shoulder_width_cm, shoulder_mean, shoulder_std);
            let height_z = z(entry.measurement.height_cm, height_mean, height_std);
            if shoulder_z <= threshold && height_z <= threshold {
                return None;
            }
            Some(Outlier {
                index,
                entry: entry.clone(),
                reason: format!("Z-score: shoulder={shoulder_z:.2}, height={height_z:.2}"),
                severity: OutlierSeverity::from_z_score(shoulder_z.max(height_z)),
            })
        })
        .collect()
}

fn consistency(entries: &[HistoryEntry]) -> f64 {
    if entries.len() < 2 {
        return 1.0;
    }
    let shoulders: Vec<f64> = entries.iter().map(|e| e.measurement.shoulder_width_cm).collect();
    let heights: Vec<f64> = entries.iter().map(|e| e.measurement.height_cm).collect();
    let shoulder = (1.0 - variance(&shoulders) / 100.0).max(0.0);
    let height = (1.0 - variance(&heights) / 1000.0).max(0.0);
    (shoulder + height) / 2.0
}

/// Average stability of each entry's preceding window of three.
fn temporal_stability(entries: &[HistoryEntry]) -> f64 {
    if entries.len() < 3 {
        return 1.0;
    }
    let window = 3.min(entries.len() - 1);
    let stability = |change: f64| {
        if change.abs() < STABLE_TREND {
            1.0
        } else {
            (1.0 - change.abs()).max(0.0)
        }
    };

    let total: f64 = (window..entries.len())
        .map(|i| {
            let recent = &entries[i - window..i];
            let shoulders: Vec<f64> = recent.iter().map(|e| e.measurement.shoulder_width_cm).collect();
            let heights: Vec<f64> = recent.iter().map(|e| e.measurement.height_cm).collect();
            (stability(relative_change(&shoulders)) + stability(relative_change(&heights))) / 2.0
        })
        .sum();
    total / (entries.len() - window) as f64
}

/// Mean relative change between consecutive values.
fn relative_change(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let total: f64 = values
        .windows(2)
        .map(|pair| if pair[0] != 0.0 { (pair[1] - pair[0]) / pair[0] } else { 0.0 })
        .sum();
    total / (values.len() - 1) as f64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}
