//! Telemetry sources for the performance monitor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;

use super::types::{PerformanceSnapshot, ThermalState};
use crate::BoxFuture;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry sensor '{sensor}' unavailable: {message}")]
    SensorUnavailable { sensor: String, message: String },

    #[error("telemetry source exhausted")]
    Exhausted,
}

/// Supplier of device telemetry.
pub trait TelemetrySource: Send + Sync {
    fn sample(&self) -> BoxFuture<'_, Result<PerformanceSnapshot, TelemetryError>>;
}

/// Replays a fixed list of snapshots.
///
/// Once the script runs out the last snapshot repeats, unless the source
/// was built with [`ScriptedTelemetry::exhausting`].
pub struct ScriptedTelemetry {
    script: Mutex<VecDeque<PerformanceSnapshot>>,
    last: Mutex<Option<PerformanceSnapshot>>,
    repeat_last: bool,
}

impl ScriptedTelemetry {
    pub fn new(snapshots: impl IntoIterator<Item = PerformanceSnapshot>) -> Self {
        Self {
            script: Mutex::new(snapshots.into_iter().collect()),
            last: Mutex::new(None),
            repeat_last: true,
        }
    }

    /// Report [`TelemetryError::Exhausted`] after the last snapshot.
    pub fn exhausting(snapshots: impl IntoIterator<Item = PerformanceSnapshot>) -> Self {
        Self {
            repeat_last: false,
            ..Self::new(snapshots)
        }
    }

    pub fn push(&self, snapshot: PerformanceSnapshot) {
        self.script.lock().push_back(snapshot);
    }

    fn next(&self) -> Result<PerformanceSnapshot, TelemetryError> {
        let mut last = self.last.lock();
        match self.script.lock().pop_front() {
            Some(mut snapshot) => {
                snapshot.timestamp = Utc::now();
                *last = Some(snapshot.clone());
                Ok(snapshot)
            }
            None if self.repeat_last => last
                .clone()
                .map(|mut s| {
                    s.timestamp = Utc::now();
                    s
                })
                .ok_or(TelemetryError::Exhausted),
            None => Err(TelemetryError::Exhausted),
        }
    }
}

impl TelemetrySource for ScriptedTelemetry {
    fn sample(&self) -> BoxFuture<'_, Result<PerformanceSnapshot, TelemetryError>> {
        let result = self.next();
        Box::pin(async move { result })
    }
}

/// Load profile followed by [`SyntheticTelemetry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticProfile {
    pub base_frame_rate: f64,
    /// Frame-rate swing around the base.
    pub frame_rate_swing: f64,
    pub memory_budget_mb: f64,
    pub base_memory_ratio: f64,
    /// Memory growth per tick, as a ratio of the budget.
    pub memory_growth: f64,
    pub base_cpu: f64,
    pub starting_battery: f64,
    /// Battery drained per tick.
    pub battery_drain: f64,
}

impl Default for SyntheticProfile {
    fn default() -> Self {
        Self {
            base_frame_rate: 30.0,
            frame_rate_swing: 6.0,
            memory_budget_mb: 1024.0,
            base_memory_ratio: 0.45,
            memory_growth: 0.01,
            base_cpu: 0.45,
            starting_battery: 0.6,
            battery_drain: 0.01,
        }
    }
}

/// Deterministic device simulator.
///
/// Frame rate oscillates, memory creeps up, the battery drains and the
/// device heats up as CPU load rises.
pub struct SyntheticTelemetry {
    profile: SyntheticProfile,
    tick: AtomicU64,
}

impl SyntheticTelemetry {
    pub fn new(profile: SyntheticProfile) -> Self {
        Self {
            profile,
            tick: AtomicU64::new(0),
        }
    }

    /// Snapshot for a given tick number.
    pub fn snapshot_at(&self, tick: u64) -> PerformanceSnapshot {
        let p = &self.profile;
        let t = tick as f64;

        let frame_rate = (p.base_frame_rate + p.frame_rate_swing * (t * 0.5).sin()).max(1.0);
        let memory_usage_ratio = (p.base_memory_ratio + p.memory_growth * t).clamp(0.0, 1.0);
        let cpu_usage_ratio = (p.base_cpu + 0.2 * (t * 0.3).sin().abs()).clamp(0.0, 1.0);
        let battery_level = (p.starting_battery - p.battery_drain * t).clamp(0.0, 1.0);
        let thermal_state = if cpu_usage_ratio > 0.9 {
            ThermalState::Serious
        } else if cpu_usage_ratio > 0.6 {
            ThermalState::Fair
        } else {
            ThermalState::Normal
        };

        PerformanceSnapshot {
            frame_rate,
            frame_processing_time_ms: 1000.0 / frame_rate,
            memory_usage_ratio,
            memory_used_mb: memory_usage_ratio * p.memory_budget_mb,
            cpu_usage_ratio,
            battery_level,
            thermal_state,
            storage_usage_ratio: 0.3,
            timestamp: Utc::now(),
        }
    }
}

impl Default for SyntheticTelemetry {
    fn default() -> Self {
        Self::new(SyntheticProfile::default())
    }
}

impl TelemetrySource for SyntheticTelemetry {
    fn sample(&self) -> BoxFuture<'_, Result<PerformanceSnapshot, TelemetryError>> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.snapshot_at(tick);
        Box::pin(async move { Ok(snapshot) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_repeats_last() {
        let source = ScriptedTelemetry::new([
            PerformanceSnapshot {
                frame_rate: 25.0,
                ..Default::default()
            },
            PerformanceSnapshot {
                frame_rate: 15.0,
                ..Default::default()
            },
        ]);
        assert_eq!(source.sample().await.unwrap().frame_rate, 25.0);
        assert_eq!(source.sample().await.unwrap().frame_rate, 15.0);
        assert_eq!(source.sample().await.unwrap().frame_rate, 15.0);
    }

    #[tokio::test]
    async fn test_scripted_exhausting() {
        let source = ScriptedTelemetry::exhausting([PerformanceSnapshot::default()]);
        assert!(source.sample().await.is_ok());
        assert!(matches!(source.sample().await, Err(TelemetryError::Exhausted)));
    }

    #[tokio::test]
    async fn test_empty_script_is_exhausted() {
        let source = ScriptedTelemetry::new(Vec::new());
        assert!(matches!(source.sample().await, Err(TelemetryError::Exhausted)));
    }

    #[test]
    fn test_synthetic_battery_drains() {
        let source = SyntheticTelemetry::default();
        let first = source.snapshot_at(0);
        let later = source.snapshot_at(20);
        assert!(later.battery_level < first.battery_level);
        assert!(later.memory_usage_ratio > first.memory_usage_ratio);
        assert!((0.0..=1.0).contains(&later.battery_level));
    }

    #[tokio::test]
    async fn test_synthetic_advances_ticks() {
        let source = SyntheticTelemetry::default();
        let a = source.sample().await.unwrap();
        let b = source.sample().await.unwrap();
        assert_ne!(a.frame_rate, b.frame_rate);
    }
}
