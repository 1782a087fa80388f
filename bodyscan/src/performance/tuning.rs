//! Shared tuning state.
//!
//! The optimizer writes, detection reads. Every field is an atomic so
//! readers on the frame path never block on the control loop.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::{DeviceCapabilities, PerformanceTier};

/// Slowest frame rate the optimizer will ever request.
pub const MIN_FRAME_RATE: u32 = 15;

/// Smallest memory budget the optimizer will ever request.
pub const MIN_MEMORY_LIMIT_MB: u64 = 256;

/// Detection quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingQuality {
    Low,
    Medium,
    High,
}

impl ProcessingQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingQuality::Low => "low",
            ProcessingQuality::Medium => "medium",
            ProcessingQuality::High => "high",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            ProcessingQuality::Low => 0,
            ProcessingQuality::Medium => 1,
            ProcessingQuality::High => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ProcessingQuality::Low,
            2 => ProcessingQuality::High,
            _ => ProcessingQuality::Medium,
        }
    }
}

impl fmt::Display for ProcessingQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How hard the pipeline is allowed to push the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Aggressive,
    Balanced,
    Conservative,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Aggressive => "aggressive",
            ProcessingMode::Balanced => "balanced",
            ProcessingMode::Conservative => "conservative",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            ProcessingMode::Aggressive => 0,
            ProcessingMode::Balanced => 1,
            ProcessingMode::Conservative => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ProcessingMode::Aggressive,
            2 => ProcessingMode::Conservative,
            _ => ProcessingMode::Balanced,
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live tuning knobs.
///
/// Setters are idempotent: writing the current value is a no-op and is
/// not logged.
#[derive(Debug)]
pub struct TuningState {
    frame_rate: AtomicU32,
    quality: AtomicU8,
    memory_limit_mb: AtomicU64,
    processing_mode: AtomicU8,
}

impl Default for TuningState {
    fn default() -> Self {
        Self::new(30, ProcessingQuality::Medium, 512, ProcessingMode::Balanced)
    }
}

impl TuningState {
    pub fn new(
        frame_rate: u32,
        quality: ProcessingQuality,
        memory_limit_mb: u64,
        processing_mode: ProcessingMode,
    ) -> Self {
        Self {
            frame_rate: AtomicU32::new(frame_rate.max(1)),
            quality: AtomicU8::new(quality.to_u8()),
            memory_limit_mb: AtomicU64::new(memory_limit_mb.max(1)),
            processing_mode: AtomicU8::new(processing_mode.to_u8()),
        }
    }

    /// Starting point derived from the device profile.
    ///
    /// The frame rate follows the tier's recommended frame interval.
    pub fn from_capabilities(capabilities: &DeviceCapabilities) -> Self {
        let interval_ms = capabilities.recommended_frame_interval.as_millis().max(1) as u32;
        let quality = match capabilities.performance_tier {
            PerformanceTier::HighEnd => ProcessingQuality::High,
            PerformanceTier::MidRange => ProcessingQuality::Medium,
            PerformanceTier::LowEnd => ProcessingQuality::Low,
        };
        let mode = match capabilities.performance_tier {
            PerformanceTier::LowEnd => ProcessingMode::Conservative,
            _ => ProcessingMode::Balanced,
        };
        Self::new(
            (1000 / interval_ms).max(1),
            quality,
            (capabilities.memory_mb() * 0.3) as u64,
            mode,
        )
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate.load(Ordering::Relaxed)
    }

    /// Time between frames at the current frame rate.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.frame_rate().max(1)))
    }

    pub fn set_frame_rate(&self, frame_rate: u32) {
        let frame_rate = frame_rate.max(1);
        let previous = self.frame_rate.swap(frame_rate, Ordering::Relaxed);
        if previous != frame_rate {
            tracing::debug!(from = previous, to = frame_rate, "Frame rate changed");
        }
    }

    pub fn quality(&self) -> ProcessingQuality {
        ProcessingQuality::from_u8(self.quality.load(Ordering::Relaxed))
    }

    pub fn set_quality(&self, quality: ProcessingQuality) {
        let previous = ProcessingQuality::from_u8(self.quality.swap(quality.to_u8(), Ordering::Relaxed));
        if previous != quality {
            tracing::info!(from = %previous, to = %quality, "Processing quality changed");
        }
    }

    pub fn memory_limit_mb(&self) -> u64 {
        self.memory_limit_mb.load(Ordering::Relaxed)
    }

    pub fn set_memory_limit_mb(&self, limit_mb: u64) {
        let limit_mb = limit_mb.max(1);
        let previous = self.memory_limit_mb.swap(limit_mb, Ordering::Relaxed);
        if previous != limit_mb {
            tracing::debug!(from = previous, to = limit_mb, "Memory limit changed");
        }
    }

    pub fn processing_mode(&self) -> ProcessingMode {
        ProcessingMode::from_u8(self.processing_mode.load(Ordering::Relaxed))
    }

    pub fn set_processing_mode(&self, mode: ProcessingMode) {
        let previous = ProcessingMode::from_u8(self.processing_mode.swap(mode.to_u8(), Ordering::Relaxed));
        if previous != mode {
            tracing::info!(from = %previous, to = %mode, "Processing mode changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = TuningState::default();
        assert_eq!(state.frame_rate(), 30);
        assert_eq!(state.frame_interval(), Duration::from_millis(33));
        assert_eq!(state.quality(), ProcessingQuality::Medium);
        assert_eq!(state.memory_limit_mb(), 512);
        assert_eq!(state.processing_mode(), ProcessingMode::Balanced);
    }

    #[test]
    fn test_setters_are_idempotent() {
        let state = TuningState::default();
        for _ in 0..3 {
            state.set_frame_rate(20);
            state.set_quality(ProcessingQuality::Low);
            state.set_memory_limit_mb(300);
            state.set_processing_mode(ProcessingMode::Conservative);
        }
        assert_eq!(state.frame_rate(), 20);
        assert_eq!(state.frame_interval(), Duration::from_millis(50));
        assert_eq!(state.quality(), ProcessingQuality::Low);
        assert_eq!(state.memory_limit_mb(), 300);
        assert_eq!(state.processing_mode(), ProcessingMode::Conservative);
    }

    #[test]
    fn test_zero_values_stay_positive() {
        let state = TuningState::default();
        state.set_frame_rate(0);
        state.set_memory_limit_mb(0);
        assert_eq!(state.frame_rate(), 1);
        assert_eq!(state.memory_limit_mb(), 1);
    }

    #[test]
    fn test_from_capabilities() {
        let caps = DeviceCapabilities::default_mid_range();
        let state = TuningState::from_capabilities(&caps);
        assert_eq!(state.frame_rate(), 10);
        assert_eq!(state.quality(), ProcessingQuality::Medium);
        assert_eq!(state.memory_limit_mb(), (caps.memory_mb() * 0.3) as u64);
    }

    #[test]
    fn test_quality_ordering() {
        assert!(ProcessingQuality::High > ProcessingQuality::Medium);
        assert!(ProcessingQuality::Medium > ProcessingQuality::Low);
    }
}
