//! Device capability types.

use std::time::Duration;

/// Coarse device-capability bucket driving default tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PerformanceTier {
    /// Less than the mid-range thresholds.
    LowEnd,
    /// At least 4GB memory and 6 cores.
    #[default]
    MidRange,
    /// At least 6GB memory and 8 cores.
    HighEnd,
}

impl PerformanceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceTier::HighEnd => "high-end",
            PerformanceTier::MidRange => "mid-range",
            PerformanceTier::LowEnd => "low-end",
        }
    }

    /// Ceiling for concurrently running processing operations.
    pub fn max_concurrent_operations(&self) -> usize {
        match self {
            PerformanceTier::HighEnd => 5,
            PerformanceTier::MidRange => 3,
            PerformanceTier::LowEnd => 2,
        }
    }
}

impl std::fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw hardware facts reported by a [`DeviceProbe`](super::DeviceProbe).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardwareInfo {
    pub memory_gb: f64,
    pub processor_cores: u32,
}

/// Capability profile derived once per process from the hardware facts.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    pub performance_tier: PerformanceTier,
    pub memory_gb: f64,
    pub processor_cores: u32,
    pub has_high_performance_gpu: bool,
    pub supports_advanced_ar: bool,
    /// Baseline interval between processed frames.
    pub recommended_frame_interval: Duration,
    pub max_concurrent_operations: usize,
}

impl DeviceCapabilities {
    /// Mid-range profile used whenever the probe fails.
    ///
    /// Capability detection must never block startup, so a failed probe
    /// degrades to these values instead of an error.
    pub fn default_mid_range() -> Self {
        Self {
            performance_tier: PerformanceTier::MidRange,
            memory_gb: 4.0,
            processor_cores: 6,
            has_high_performance_gpu: true,
            supports_advanced_ar: true,
            recommended_frame_interval: Duration::from_millis(100),
            max_concurrent_operations: PerformanceTier::MidRange.max_concurrent_operations(),
        }
    }

    /// Device memory in megabytes.
    pub fn memory_mb(&self) -> f64 {
        self.memory_gb * 1024.0
    }
}

/// Timing sample for a single processed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    pub frame_processing_time: Duration,
    pub memory_usage_mb: f64,
    pub cpu_usage_ratio: f64,
}

/// Memory budget scaled to the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryBounds {
    pub max_cache_size_mb: f64,
    pub max_history_entries: usize,
    /// Fraction of the cache budget at which cleanup should run.
    pub gc_threshold: f64,
}

/// Direction of frame-time change across recent samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceTrend {
    Improving,
    Stable,
    Degrading,
}

impl std::fmt::Display for PerformanceTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PerformanceTrend::Improving => write!(f, "improving"),
            PerformanceTrend::Stable => write!(f, "stable"),
            PerformanceTrend::Degrading => write!(f, "degrading"),
        }
    }
}

/// Aggregate view over the recorded frame timings.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTimingStats {
    pub average_frame_time: Duration,
    pub average_memory_usage_mb: f64,
    pub average_cpu_usage_ratio: f64,
    pub trend: PerformanceTrend,
    pub sample_count: usize,
}
