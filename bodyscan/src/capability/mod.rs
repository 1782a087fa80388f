//! Device capability profiling.
//!
//! Classifies the device into a [`PerformanceTier`] and derives the baseline
//! tuning knobs used by detection and the performance optimizer.
//!
//! | Tier      | Memory | Cores | Frame interval | Max concurrent ops |
//! |-----------|--------|-------|----------------|--------------------|
//! | high-end  | ≥ 6GB  | ≥ 8   | 50ms           | 5                  |
//! | mid-range | ≥ 4GB  | ≥ 6   | 100ms          | 3                  |
//! | low-end   | other  | other | 200ms          | 2                  |
//!
//! Detection happens once per process and is cached until
//! [`CapabilityProfiler::reset`]. Probe failures never propagate: the
//! profiler falls back to [`DeviceCapabilities::default_mid_range`].

mod probe;
mod profiler;
mod types;

pub use probe::{DeviceProbe, ProbeError, StaticProbe, SystemProbe};
pub use profiler::{CapabilityConfig, CapabilityProfiler};
pub use types::{
    DeviceCapabilities, FrameTiming, FrameTimingStats, HardwareInfo, MemoryBounds,
    PerformanceTier, PerformanceTrend,
};
