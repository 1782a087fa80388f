//! Short-horizon performance prediction.
//!
//! A [`PredictiveModel`] maps a feature vector (the recent values of one
//! metric, oldest first) to a prediction. [`LinearModel`] fits a
//! least-squares line and extrapolates it; any other model can be plugged
//! into the [`Predictor`] without touching the optimizer.

use std::time::Duration;

use super::types::{PerformanceSnapshot, ThermalState};

/// Ticks ahead the default models look.
pub const DEFAULT_HORIZON: usize = 5;

/// Samples needed for full prediction confidence.
const FULL_CONFIDENCE_SAMPLES: usize = 20;

/// Battery drain, in percent per minute, treated as high.
pub const HIGH_BATTERY_DRAIN: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub value: f64,
    /// Change per sample of the fitted trend.
    pub slope: f64,
}

pub trait PredictiveModel: Send + Sync {
    fn name(&self) -> &str;

    /// `None` when there are no features to predict from.
    fn predict(&self, features: &[f64]) -> Option<Prediction>;
}

/// Least-squares trend extrapolation.
#[derive(Debug, Clone)]
pub struct LinearModel {
    name: String,
    horizon: usize,
    bounds: (f64, f64),
}

impl LinearModel {
    pub fn new(name: impl Into<String>, horizon: usize) -> Self {
        Self {
            name: name.into(),
            horizon,
            bounds: (f64::MIN, f64::MAX),
        }
    }

    /// Clamp predictions to `[min, max]`.
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = (min, max);
        self
    }

    fn fit(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = values.iter().sum::<f64>() / n;
        let (mut cov, mut var) = (0.0, 0.0);
        for (i, y) in values.iter().enumerate() {
            let dx = i as f64 - mean_x;
            cov += dx * (y - mean_y);
            var += dx * dx;
        }
        let slope = if var > 0.0 { cov / var } else { 0.0 };
        (slope, mean_y - slope * mean_x)
    }
}

impl PredictiveModel for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &[f64]) -> Option<Prediction> {
        if features.is_empty() {
            return None;
        }
        let (slope, intercept) = Self::fit(features);
        let x = (features.len() - 1 + self.horizon) as f64;
        let value = (intercept + slope * x).clamp(self.bounds.0, self.bounds.1);
        Some(Prediction { value, slope })
    }
}

/// Combined predictions for one optimizer pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformancePrediction {
    pub frame_rate: f64,
    pub memory_mb: f64,
    /// Percent of battery per minute.
    pub battery_drain: f64,
    pub thermal_state: ThermalState,
    pub confidence: f64,
    pub recommendations: Vec<String>,
}

impl Default for PerformancePrediction {
    fn default() -> Self {
        Self {
            frame_rate: 30.0,
            memory_mb: 400.0,
            battery_drain: 2.0,
            thermal_state: ThermalState::Normal,
            confidence: 0.5,
            recommendations: Vec::new(),
        }
    }
}

/// Runs one model per metric over the snapshot history.
pub struct Predictor {
    frame_rate: Box<dyn PredictiveModel>,
    memory: Box<dyn PredictiveModel>,
    battery: Box<dyn PredictiveModel>,
    thermal: Box<dyn PredictiveModel>,
    tick_interval: Duration,
    window: usize,
}

impl Predictor {
    /// Linear models with the given horizon.
    pub fn linear(horizon: usize, tick_interval: Duration) -> Self {
        Self {
            frame_rate: Box::new(LinearModel::new("frame_rate", horizon).with_bounds(0.0, 240.0)),
            memory: Box::new(LinearModel::new("memory_usage", horizon).with_bounds(0.0, f64::MAX)),
            battery: Box::new(LinearModel::new("battery_level", horizon).with_bounds(0.0, 1.0)),
            thermal: Box::new(LinearModel::new("thermal_state", horizon).with_bounds(0.0, 3.0)),
            tick_interval,
            window: FULL_CONFIDENCE_SAMPLES,
        }
    }

    pub fn with_frame_rate_model(mut self, model: Box<dyn PredictiveModel>) -> Self {
        self.frame_rate = model;
        self
    }

    pub fn with_memory_model(mut self, model: Box<dyn PredictiveModel>) -> Self {
        self.memory = model;
        self
    }

    pub fn with_battery_model(mut self, model: Box<dyn PredictiveModel>) -> Self {
        self.battery = model;
        self
    }

    pub fn with_thermal_model(mut self, model: Box<dyn PredictiveModel>) -> Self {
        self.thermal = model;
        self
    }

    /// `0.5 + 0.5 · min(n, 20) / 20`.
    pub fn confidence(samples: usize) -> f64 {
        0.5 + 0.5 * samples.min(FULL_CONFIDENCE_SAMPLES) as f64 / FULL_CONFIDENCE_SAMPLES as f64
    }

    /// Predict from the most recent snapshots, oldest first.
    pub fn predict(&self, history: &[PerformanceSnapshot]) -> PerformancePrediction {
        let recent = &history[history.len().saturating_sub(self.window)..];
        if recent.is_empty() {
            return PerformancePrediction::default();
        }
        let series = |f: fn(&PerformanceSnapshot) -> f64| recent.iter().map(f).collect::<Vec<_>>();
        let defaults = PerformancePrediction::default();

        let frame_rate = self
            .frame_rate
            .predict(&series(|s| s.frame_rate))
            .map_or(defaults.frame_rate, |p| p.value);
        let memory_mb = self
            .memory
            .predict(&series(|s| s.memory_used_mb))
            .map_or(defaults.memory_mb, |p| p.value);
        let battery_drain = self
            .battery
            .predict(&series(|s| s.battery_level))
            .map_or(defaults.battery_drain, |p| {
                let ticks_per_minute = 60.0 / self.tick_interval.as_secs_f64().max(0.001);
                (-p.slope * 100.0 * ticks_per_minute).max(0.0)
            });
        let thermal_state = self
            .thermal
            .predict(&series(|s| s.thermal_state.level()))
            .map_or(defaults.thermal_state, |p| ThermalState::from_level(p.value));

        let mut recommendations = Vec::new();
        if frame_rate < 20.0 {
            recommendations.push("Consider reducing quality to improve frame rate".to_string());
        }
        if memory_mb > 500.0 {
            recommendations.push("High memory usage detected - consider optimization".to_string());
        }
        if battery_drain > HIGH_BATTERY_DRAIN {
            recommendations.push("High battery drain - consider power optimization".to_string());
        }
        if thermal_state >= ThermalState::Serious {
            recommendations.push("Thermal issues predicted - reduce processing load".to_string());
        }

        PerformancePrediction {
            frame_rate,
            memory_mb,
            battery_drain,
            thermal_state,
            confidence: Self::confidence(recent.len()),
            recommendations,
        }
    }
}

impl Default for Predictor {
    fn default() -> Self {
        Self::linear(DEFAULT_HORIZON, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshots(frame_rates: &[f64]) -> Vec<PerformanceSnapshot> {
        frame_rates
            .iter()
            .map(|&frame_rate| PerformanceSnapshot {
                frame_rate,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_linear_model_extrapolates() {
        let model = LinearModel::new("test", 5);
        let prediction = model.predict(&[10.0, 12.0, 14.0, 16.0]).unwrap();
        assert!((prediction.slope - 2.0).abs() < 1e-9);
        // last index 3, plus 5 ticks: 10 + 2 * 8
        assert!((prediction.value - 26.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_model_single_value_is_flat() {
        let model = LinearModel::new("test", 5);
        let prediction = model.predict(&[42.0]).unwrap();
        assert_eq!(prediction.value, 42.0);
        assert_eq!(prediction.slope, 0.0);
        assert!(model.predict(&[]).is_none());
    }

    #[test]
    fn test_bounds_clamp() {
        let model = LinearModel::new("battery", 5).with_bounds(0.0, 1.0);
        let prediction = model.predict(&[0.3, 0.2, 0.1]).unwrap();
        assert_eq!(prediction.value, 0.0);
    }

    #[test]
    fn test_confidence_grows_with_samples() {
        assert_eq!(Predictor::confidence(0), 0.5);
        assert_eq!(Predictor::confidence(10), 0.75);
        assert_eq!(Predictor::confidence(20), 1.0);
        assert_eq!(Predictor::confidence(80), 1.0);
    }

    #[test]
    fn test_empty_history_gives_defaults() {
        assert_eq!(Predictor::default().predict(&[]), PerformancePrediction::default());
    }

    #[test]
    fn test_falling_frame_rate_is_predicted() {
        let prediction = Predictor::default().predict(&snapshots(&[30.0, 27.0, 24.0, 21.0]));
        assert!(prediction.frame_rate < 20.0);
        assert!(prediction
            .recommendations
            .iter()
            .any(|r| r.contains("frame rate")));
    }

    #[test]
    fn test_battery_drain_per_minute() {
        // 0.1% per one-second tick is 6% per minute
        let history: Vec<PerformanceSnapshot> = (0..5)
            .map(|i| PerformanceSnapshot {
                battery_level: 0.5 - 0.001 * i as f64,
                ..Default::default()
            })
            .collect();
        let prediction = Predictor::default().predict(&history);
        assert!((prediction.battery_drain - 6.0).abs() < 1e-6);
        assert!(prediction.battery_drain > HIGH_BATTERY_DRAIN);
    }

    struct ConstantModel(f64);

    impl PredictiveModel for ConstantModel {
        fn name(&self) -> &str {
            "constant"
        }

        fn predict(&self, _features: &[f64]) -> Option<Prediction> {
            Some(Prediction {
                value: self.0,
                slope: 0.0,
            })
        }
    }

    #[test]
    fn test_models_are_pluggable() {
        let predictor = Predictor::default()
            .with_thermal_model(Box::new(ConstantModel(3.0)))
            .with_memory_model(Box::new(ConstantModel(900.0)));
        let prediction = predictor.predict(&snapshots(&[30.0]));
        assert_eq!(prediction.thermal_state, ThermalState::Critical);
        assert_eq!(prediction.memory_mb, 900.0);
        assert_eq!(prediction.recommendations.len(), 2);
    }
}
