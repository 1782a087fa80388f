//! Performance optimizer.
//!
//! Turns the latest snapshot, the device tier and short-horizon predictions
//! into an [`OptimizationDecision`], then writes it to the shared
//! [`TuningState`].
//!
//! | Knob        | Rule                                                                  |
//! |-------------|-----------------------------------------------------------------------|
//! | quality     | high: high-end, ≥25 fps, <400 MB, battery >30%                        |
//! |             | medium: mid-range or better, ≥20 fps, <300 MB, battery >20%           |
//! |             | low: otherwise                                                        |
//! | frame rate  | tier base 60/30/20, capped under stress, floor 15                     |
//! | memory      | min(30% of device memory, max), shrunk near 80%/90% use, floor 256 MB |
//! | mode        | conservative under any hard stress, aggressive when all is excellent  |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::monitor::TickObserver;
use super::predict::{PerformancePrediction, Predictor, HIGH_BATTERY_DRAIN};
use super::tuning::{
    ProcessingMode, ProcessingQuality, TuningState, MIN_FRAME_RATE, MIN_MEMORY_LIMIT_MB,
};
use super::types::{PerformanceSnapshot, ThermalState, TickReport};
use crate::capability::{CapabilityProfiler, DeviceCapabilities, PerformanceTier};
use crate::history::BoundedHistory;

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Frame rate used when dynamic frame rate is disabled.
    pub target_frame_rate: u32,
    pub max_memory_mb: f64,
    /// Battery percentage below which battery optimization kicks in.
    pub battery_threshold_percent: f64,
    pub history_size: usize,
    pub enable_adaptive_quality: bool,
    pub enable_dynamic_frame_rate: bool,
    pub enable_memory_optimization: bool,
    pub enable_battery_optimization: bool,
    pub enable_thermal_management: bool,
    pub enable_predictive_optimization: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            target_frame_rate: 30,
            max_memory_mb: 512.0,
            battery_threshold_percent: 20.0,
            history_size: 50,
            enable_adaptive_quality: true,
            enable_dynamic_frame_rate: true,
            enable_memory_optimization: true,
            enable_battery_optimization: true,
            enable_thermal_management: true,
            enable_predictive_optimization: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationDecision {
    pub frame_rate: u32,
    pub quality: ProcessingQuality,
    pub memory_limit_mb: u64,
    pub processing_mode: ProcessingMode,
    /// Labels for the knobs that were set.
    pub applied_optimizations: Vec<String>,
    /// Battery, thermal and predictive advice.
    pub recommendations: Vec<String>,
    /// Reporting only, 0..1.
    pub estimated_improvement: f64,
    pub decided_at: DateTime<Utc>,
}

impl OptimizationDecision {
    /// Decision used before any telemetry exists.
    pub fn fallback() -> Self {
        Self {
            frame_rate: 30,
            quality: ProcessingQuality::Medium,
            memory_limit_mb: 512,
            processing_mode: ProcessingMode::Balanced,
            applied_optimizations: vec!["Default optimization applied".to_string()],
            recommendations: Vec::new(),
            estimated_improvement: 0.1,
            decided_at: Utc::now(),
        }
    }
}

struct OptimizerState {
    current: Option<OptimizationDecision>,
    history: BoundedHistory<OptimizationDecision>,
}

pub struct PerformanceOptimizer {
    config: OptimizerConfig,
    profiler: Arc<CapabilityProfiler>,
    tuning: Arc<TuningState>,
    predictor: Predictor,
    state: Mutex<OptimizerState>,
}

impl PerformanceOptimizer {
    pub fn new(
        config: OptimizerConfig,
        profiler: Arc<CapabilityProfiler>,
        tuning: Arc<TuningState>,
        predictor: Predictor,
    ) -> Self {
        let history = BoundedHistory::new(config.history_size);
        Self {
            config,
            profiler,
            tuning,
            predictor,
            state: Mutex::new(OptimizerState {
                current: None,
                history,
            }),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn tuning(&self) -> &Arc<TuningState> {
        &self.tuning
    }

    /// Compute a decision from `history` (oldest first) without applying it.
    pub fn decide(&self, history: &[PerformanceSnapshot]) -> OptimizationDecision {
        let Some(current) = history.last() else {
            return OptimizationDecision::fallback();
        };
        let capabilities = self.profiler.detect();
        let prediction = if self.config.enable_predictive_optimization {
            self.predictor.predict(history)
        } else {
            PerformancePrediction::default()
        };
        self.decide_with(current, &capabilities, &prediction)
    }

    fn decide_with(
        &self,
        current: &PerformanceSnapshot,
        capabilities: &DeviceCapabilities,
        prediction: &PerformancePrediction,
    ) -> OptimizationDecision {
        let mut applied = Vec::new();
        let mut recommendations = Vec::new();
        let tier = capabilities.performance_tier;

        let quality = if self.config.enable_adaptive_quality {
            let quality = optimal_quality(tier, current);
            applied.push(format!("Adaptive quality set to {}", quality));
            quality
        } else {
            ProcessingQuality::High
        };

        let frame_rate = if self.config.enable_dynamic_frame_rate {
            let frame_rate = optimal_frame_rate(tier, current, prediction);
            applied.push(format!("Frame rate optimized to {} FPS", frame_rate));
            frame_rate
        } else {
            self.config.target_frame_rate.max(MIN_FRAME_RATE)
        };

        let memory_limit_mb = if self.config.enable_memory_optimization {
            let limit = self.optimal_memory_limit(capabilities, current, prediction);
            applied.push(format!("Memory limit set to {} MB", limit));
            limit
        } else {
            (self.config.max_memory_mb as u64).max(MIN_MEMORY_LIMIT_MB)
        };

        if self.config.enable_battery_optimization {
            recommendations.extend(self.battery_strategies(current, prediction));
        }
        if self.config.enable_thermal_management {
            recommendations.extend(thermal_strategies(current, prediction));
        }
        recommendations.extend(prediction.recommendations.iter().cloned());

        let processing_mode = processing_mode(tier, current);
        applied.push(format!("Processing mode set to {}", processing_mode));

        let estimated_improvement =
            estimated_improvement(current, frame_rate, memory_limit_mb, quality, processing_mode);

        OptimizationDecision {
            frame_rate,
            quality,
            memory_limit_mb,
            processing_mode,
            applied_optimizations: applied,
            recommendations,
            estimated_improvement,
            decided_at: Utc::now(),
        }
    }

    fn optimal_memory_limit(
        &self,
        capabilities: &DeviceCapabilities,
        current: &PerformanceSnapshot,
        prediction: &PerformancePrediction,
    ) -> u64 {
        let floor = MIN_MEMORY_LIMIT_MB as f64;
        let mut limit = (capabilities.memory_mb() * 0.3).min(self.config.max_memory_mb);
        if current.memory_used_mb > limit * 0.8 {
            limit = (limit * 0.8).max(floor);
        }
        if prediction.memory_mb > limit * 0.9 {
            limit = (limit * 0.9).max(floor);
        }
        limit.max(floor) as u64
    }

    fn battery_strategies(
        &self,
        current: &PerformanceSnapshot,
        prediction: &PerformancePrediction,
    ) -> Vec<String> {
        let battery = current.battery_percent();
        let mut strategies = Vec::new();
        if battery < self.config.battery_threshold_percent {
            strategies.push("Battery optimization enabled - reduced processing".to_string());
        }
        if prediction.battery_drain > HIGH_BATTERY_DRAIN {
            strategies.push("High battery drain detected - optimizing power usage".to_string());
        }
        if battery < 10.0 {
            strategies.push("Critical battery level - minimal processing mode".to_string());
        }
        strategies
    }

    /// Write a decision to the shared tuning state.
    pub fn apply(&self, decision: &OptimizationDecision) {
        self.tuning.set_frame_rate(decision.frame_rate);
        self.tuning.set_quality(decision.quality);
        self.tuning.set_memory_limit_mb(decision.memory_limit_mb);
        self.tuning.set_processing_mode(decision.processing_mode);
    }

    /// Decide, apply and record.
    pub fn optimize(&self, history: &[PerformanceSnapshot]) -> OptimizationDecision {
        let decision = self.decide(history);
        self.apply(&decision);

        tracing::debug!(
            frame_rate = decision.frame_rate,
            quality = %decision.quality,
            memory_limit_mb = decision.memory_limit_mb,
            mode = %decision.processing_mode,
            improvement = decision.estimated_improvement,
            "Optimization decision applied"
        );

        let mut state = self.state.lock();
        state.history.push(decision.clone());
        state.current = Some(decision.clone());
        decision
    }

    pub fn current(&self) -> Option<OptimizationDecision> {
        self.state.lock().current.clone()
    }

    /// Decision history, oldest first.
    pub fn history(&self) -> Vec<OptimizationDecision> {
        self.state.lock().history.snapshot()
    }

    /// Forget the current decision. Tuning keeps its last values.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.current = None;
        state.history.clear();
    }
}

impl TickObserver for PerformanceOptimizer {
    fn on_tick(&self, _report: &TickReport, history: &[PerformanceSnapshot]) {
        self.optimize(history);
    }
}

fn optimal_quality(tier: PerformanceTier, s: &PerformanceSnapshot) -> ProcessingQuality {
    let battery = s.battery_percent();
    if tier == PerformanceTier::HighEnd
        && s.frame_rate >= 25.0
        && s.memory_used_mb < 400.0
        && battery > 30.0
    {
        ProcessingQuality::High
    } else if tier >= PerformanceTier::MidRange
        && s.frame_rate >= 20.0
        && s.memory_used_mb < 300.0
        && battery > 20.0
    {
        ProcessingQuality::Medium
    } else {
        ProcessingQuality::Low
    }
}

fn optimal_frame_rate(
    tier: PerformanceTier,
    s: &PerformanceSnapshot,
    prediction: &PerformancePrediction,
) -> u32 {
    let mut frame_rate: u32 = match tier {
        PerformanceTier::HighEnd => 60,
        PerformanceTier::MidRange => 30,
        PerformanceTier::LowEnd => 20,
    };

    if s.frame_rate < 15.0 {
        frame_rate = frame_rate.min(20);
    } else if s.frame_rate < 25.0 {
        frame_rate = frame_rate.min(30);
    }

    let battery = s.battery_percent();
    if battery < 20.0 {
        frame_rate = frame_rate.min(20);
    } else if battery < 40.0 {
        frame_rate = frame_rate.min(30);
    }

    if prediction.frame_rate < 20.0 {
        frame_rate = frame_rate.min(20);
    }

    frame_rate.max(MIN_FRAME_RATE)
}

fn thermal_strategies(s: &PerformanceSnapshot, prediction: &PerformancePrediction) -> Vec<String> {
    let mut strategies = Vec::new();
    if s.thermal_state >= ThermalState::Serious {
        strategies.push("Thermal throttling enabled - reducing processing load".to_string());
    }
    if prediction.thermal_state >= ThermalState::Serious {
        strategies.push("Predicted thermal issues - proactive optimization".to_string());
    }
    if s.thermal_state == ThermalState::Fair {
        strategies.push("Thermal monitoring active - maintaining optimal temperature".to_string());
    }
    strategies
}

fn processing_mode(tier: PerformanceTier, s: &PerformanceSnapshot) -> ProcessingMode {
    let battery = s.battery_percent();
    if tier == PerformanceTier::LowEnd
        || s.frame_rate < 15.0
        || s.memory_used_mb > 500.0
        || battery < 20.0
        || s.thermal_state >= ThermalState::Serious
    {
        ProcessingMode::Conservative
    } else if tier == PerformanceTier::HighEnd
        && s.frame_rate >= 30.0
        && s.memory_used_mb < 300.0
        && battery > 50.0
        && s.thermal_state == ThermalState::Normal
    {
        ProcessingMode::Aggressive
    } else {
        ProcessingMode::Balanced
    }
}

fn estimated_improvement(
    s: &PerformanceSnapshot,
    frame_rate: u32,
    memory_limit_mb: u64,
    quality: ProcessingQuality,
    mode: ProcessingMode,
) -> f64 {
    let mut improvement = 0.0;

    let target = frame_rate as f64;
    if s.frame_rate > 0.0 && target > s.frame_rate {
        improvement += (target - s.frame_rate) / s.frame_rate * 0.4;
    }

    let limit = memory_limit_mb as f64;
    if s.memory_used_mb > 0.0 && limit < s.memory_used_mb {
        improvement += (s.memory_used_mb - limit) / s.memory_used_mb * 0.3;
    }

    improvement += match quality {
        ProcessingQuality::High => 0.2,
        ProcessingQuality::Medium => 0.1,
        ProcessingQuality::Low => 0.0,
    };
    improvement += match mode {
        ProcessingMode::Aggressive => 0.1,
        ProcessingMode::Balanced => 0.05,
        ProcessingMode::Conservative => 0.0,
    };

    improvement.clamp(0.0, 1.0)
}
