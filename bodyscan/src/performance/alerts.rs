//! Tiered alert thresholds.
//!
//! Each metric has three thresholds. Crossing the first raises a `Medium`
//! alert, the second `High`, the third `Critical`. The five checks are
//! independent, so one snapshot may raise several alerts.
//!
//! | Metric           | Medium | High | Critical |
//! |------------------|--------|------|----------|
//! | Frame rate below | 30     | 25   | 20       |
//! | Memory above     | 0.6    | 0.8  | 0.9      |
//! | CPU above        | 0.7    | 0.85 | 0.95     |
//! | Battery below    | 0.2    | 0.1  | 0.05     |
//! | Thermal          | fair   | serious | critical |

use chrono::Utc;

use super::types::{AlertKind, PerformanceAlert, PerformanceSnapshot, Severity, ThermalState};

/// Three escalating thresholds for one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tiers {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Tiers {
    pub const fn new(medium: f64, high: f64, critical: f64) -> Self {
        Self {
            medium,
            high,
            critical,
        }
    }

    /// Severity for a metric where lower is worse.
    fn below(&self, value: f64) -> Option<Severity> {
        if value < self.critical {
            Some(Severity::Critical)
        } else if value < self.high {
            Some(Severity::High)
        } else if value < self.medium {
            Some(Severity::Medium)
        } else {
            None
        }
    }

    /// Severity for a metric where higher is worse.
    fn above(&self, value: f64) -> Option<Severity> {
        if value > self.critical {
            Some(Severity::Critical)
        } else if value > self.high {
            Some(Severity::High)
        } else if value > self.medium {
            Some(Severity::Medium)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    /// Frames per second; alerts fire below these.
    pub frame_rate: Tiers,
    /// Memory usage ratio; alerts fire above these.
    pub memory: Tiers,
    /// CPU usage ratio; alerts fire above these.
    pub cpu: Tiers,
    /// Battery level 0..1; alerts fire below these.
    pub battery: Tiers,
    /// Lowest thermal state that raises a `Medium` alert.
    pub thermal_medium: ThermalState,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            frame_rate: Tiers::new(30.0, 25.0, 20.0),
            memory: Tiers::new(0.6, 0.8, 0.9),
            cpu: Tiers::new(0.7, 0.85, 0.95),
            battery: Tiers::new(0.2, 0.1, 0.05),
            thermal_medium: ThermalState::Fair,
        }
    }
}

impl AlertThresholds {
    /// Run all five checks against one snapshot.
    pub fn evaluate(&self, snapshot: &PerformanceSnapshot) -> Vec<PerformanceAlert> {
        let checks = [
            self.check_frame_rate(snapshot),
            self.check_memory(snapshot),
            self.check_cpu(snapshot),
            self.check_battery(snapshot),
            self.check_thermal(snapshot),
        ];

        checks
            .into_iter()
            .flatten()
            .map(|(kind, severity, message, recommendation)| PerformanceAlert {
                kind,
                severity,
                message,
                recommendation: recommendation.to_string(),
                timestamp: Utc::now(),
                snapshot: snapshot.clone(),
            })
            .collect()
    }

    fn check_frame_rate(&self, s: &PerformanceSnapshot) -> Option<Check> {
        let severity = self.frame_rate.below(s.frame_rate)?;
        let message = match severity {
            Severity::Critical => format!("Critical frame rate: {:.1} FPS", s.frame_rate),
            Severity::High => format!("Low frame rate: {:.1} FPS", s.frame_rate),
            _ => format!("Frame rate below optimal: {:.1} FPS", s.frame_rate),
        };
        Some((
            AlertKind::FrameRate,
            severity,
            message,
            "Reduce processing quality or enable adaptive scaling",
        ))
    }

    fn check_memory(&self, s: &PerformanceSnapshot) -> Option<Check> {
        let severity = self.memory.above(s.memory_usage_ratio)?;
        let percent = s.memory_usage_ratio * 100.0;
        let message = match severity {
            Severity::Critical => format!("Critical memory usage: {:.1}%", percent),
            Severity::High => format!("High memory usage: {:.1}%", percent),
            _ => format!("Memory usage above optimal: {:.1}%", percent),
        };
        Some((
            AlertKind::Memory,
            severity,
            message,
            "Clear caches and reduce processing load",
        ))
    }

    fn check_cpu(&self, s: &PerformanceSnapshot) -> Option<Check> {
        let severity = self.cpu.above(s.cpu_usage_ratio)?;
        let percent = s.cpu_usage_ratio * 100.0;
        let message = match severity {
            Severity::Critical => format!("Critical CPU usage: {:.1}%", percent),
            Severity::High => format!("High CPU usage: {:.1}%", percent),
            _ => format!("CPU usage above optimal: {:.1}%", percent),
        };
        Some((
            AlertKind::Cpu,
            severity,
            message,
            "Reduce processing complexity or enable power saving mode",
        ))
    }

    fn check_battery(&self, s: &PerformanceSnapshot) -> Option<Check> {
        let severity = self.battery.below(s.battery_level)?;
        let percent = s.battery_percent();
        let message = match severity {
            Severity::Critical => format!("Critical battery level: {:.1}%", percent),
            Severity::High => format!("Low battery level: {:.1}%", percent),
            _ => format!("Battery level below optimal: {:.1}%", percent),
        };
        Some((
            AlertKind::Battery,
            severity,
            message,
            "Enable battery optimization mode",
        ))
    }

    fn check_thermal(&self, s: &PerformanceSnapshot) -> Option<Check> {
        if s.thermal_state < self.thermal_medium {
            return None;
        }
        let (severity, message) = match s.thermal_state {
            ThermalState::Critical => (Severity::Critical, "Critical thermal state detected"),
            ThermalState::Serious => (Severity::High, "Serious thermal state detected"),
            ThermalState::Fair => (Severity::Medium, "Thermal state is fair"),
            ThermalState::Normal => (Severity::Low, "Thermal state is normal"),
        };
        Some((
            AlertKind::Thermal,
            severity,
            message.to_string(),
            "Reduce processing load to prevent overheating",
        ))
    }
}

type Check = (AlertKind, Severity, String, &'static str);
