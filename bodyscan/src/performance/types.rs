//! Performance snapshots, alerts and derived reports.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device thermal pressure, ordered from cool to hot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermalState {
    #[default]
    Normal,
    Fair,
    Serious,
    Critical,
}

impl ThermalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThermalState::Normal => "normal",
            ThermalState::Fair => "fair",
            ThermalState::Serious => "serious",
            ThermalState::Critical => "critical",
        }
    }

    /// Ordinal used by the thermal predictor (0 = normal .. 3 = critical).
    pub fn level(&self) -> f64 {
        match self {
            ThermalState::Normal => 0.0,
            ThermalState::Fair => 1.0,
            ThermalState::Serious => 2.0,
            ThermalState::Critical => 3.0,
        }
    }

    pub fn from_level(level: f64) -> Self {
        if level >= 2.5 {
            ThermalState::Critical
        } else if level >= 1.5 {
            ThermalState::Serious
        } else if level >= 0.5 {
            ThermalState::Fair
        } else {
            ThermalState::Normal
        }
    }
}

impl fmt::Display for ThermalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub frame_rate: f64,
    pub frame_processing_time_ms: f64,
    /// Share of the memory budget in use, 0..1.
    pub memory_usage_ratio: f64,
    pub memory_used_mb: f64,
    pub cpu_usage_ratio: f64,
    /// Remaining battery, 0..1.
    pub battery_level: f64,
    pub thermal_state: ThermalState,
    pub storage_usage_ratio: f64,
    pub timestamp: DateTime<Utc>,
}

impl Default for PerformanceSnapshot {
    /// A healthy device at rest.
    fn default() -> Self {
        Self {
            frame_rate: 30.0,
            frame_processing_time_ms: 20.0,
            memory_usage_ratio: 0.4,
            memory_used_mb: 200.0,
            cpu_usage_ratio: 0.3,
            battery_level: 0.8,
            thermal_state: ThermalState::Normal,
            storage_usage_ratio: 0.5,
            timestamp: Utc::now(),
        }
    }
}

impl PerformanceSnapshot {
    pub fn battery_percent(&self) -> f64 {
        self.battery_level * 100.0
    }
}

/// Metric an alert concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    FrameRate,
    Memory,
    Cpu,
    Battery,
    Thermal,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::FrameRate => "frame_rate",
            AlertKind::Memory => "memory",
            AlertKind::Cpu => "cpu",
            AlertKind::Battery => "battery",
            AlertKind::Thermal => "thermal",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub recommendation: String,
    pub timestamp: DateTime<Utc>,
    pub snapshot: PerformanceSnapshot,
}

/// Overall health grade from [`PerformanceMonitor::status`](super::PerformanceMonitor::status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthGrade {
    Critical,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl HealthGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthGrade::Excellent
        } else if score >= 75.0 {
            HealthGrade::Good
        } else if score >= 60.0 {
            HealthGrade::Fair
        } else if score >= 40.0 {
            HealthGrade::Poor
        } else {
            HealthGrade::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthGrade::Critical => "critical",
            HealthGrade::Poor => "poor",
            HealthGrade::Fair => "fair",
            HealthGrade::Good => "good",
            HealthGrade::Excellent => "excellent",
        }
    }
}

impl fmt::Display for HealthGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceStatus {
    pub grade: HealthGrade,
    /// 0..100.
    pub score: f64,
    pub active_alerts: usize,
    pub critical_alerts: usize,
    pub monitoring: bool,
    pub latest: Option<PerformanceSnapshot>,
}

/// Direction of one metric over the retained history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Stable => "stable",
            TrendDirection::Degrading => "degrading",
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PerformanceTrends {
    pub frame_rate: TrendDirection,
    pub memory: TrendDirection,
    pub cpu: TrendDirection,
    pub battery: TrendDirection,
    pub overall: TrendDirection,
}

impl Default for PerformanceTrends {
    fn default() -> Self {
        Self {
            frame_rate: TrendDirection::Stable,
            memory: TrendDirection::Stable,
            cpu: TrendDirection::Stable,
            battery: TrendDirection::Stable,
            overall: TrendDirection::Stable,
        }
    }
}

impl PerformanceTrends {
    /// Advice for every degrading metric.
    pub fn advice(&self) -> Vec<&'static str> {
        let mut advice = Vec::new();
        if self.frame_rate == TrendDirection::Degrading {
            advice.push("Frame rate is degrading - consider reducing processing quality");
        }
        if self.memory == TrendDirection::Degrading {
            advice.push("Memory usage is increasing - clear caches and optimize memory usage");
        }
        if self.cpu == TrendDirection::Degrading {
            advice.push("CPU load is increasing - reduce processing complexity");
        }
        if self.battery == TrendDirection::Degrading {
            advice.push("Battery consumption is increasing - enable power saving mode");
        }
        advice
    }
}

/// Area an optimization recommendation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationCategory {
    Performance,
    Memory,
    Battery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub priority: Severity,
    pub title: String,
    pub description: String,
    pub implementation: String,
    /// Expected gain, in percent.
    pub estimated_improvement: f64,
}

/// Everything one monitor tick produced, handed to tick observers.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: PerformanceSnapshot,
    pub alerts: Vec<PerformanceAlert>,
}
