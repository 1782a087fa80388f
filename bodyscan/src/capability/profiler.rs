//! Capability profiler.
//!
//! Detects the device performance tier once and caches it for the process
//! lifetime. A recorded frame-timing window refines the recommended frame
//! interval at runtime without touching the cached profile.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::probe::DeviceProbe;
use super::types::{
    DeviceCapabilities, FrameTiming, FrameTimingStats, HardwareInfo, MemoryBounds,
    PerformanceTier, PerformanceTrend,
};
use crate::history::BoundedHistory;

/// Minimum samples before the frame interval is adapted.
const MIN_SAMPLES_FOR_ADAPTATION: usize = 5;

/// Window size for trend comparison (last N vs previous N).
const TREND_WINDOW: usize = 10;

/// Tier thresholds and per-tier tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityConfig {
    pub high_end_min_memory_gb: f64,
    pub high_end_min_cores: u32,
    pub mid_range_min_memory_gb: f64,
    pub mid_range_min_cores: u32,
    /// Low-end devices still support advanced tracking above this memory.
    pub low_end_advanced_min_memory_gb: f64,
    pub high_end_frame_interval: Duration,
    pub mid_range_frame_interval: Duration,
    pub low_end_frame_interval: Duration,
    /// Frame timing samples retained for adaptation.
    pub frame_history_size: usize,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            high_end_min_memory_gb: 6.0,
            high_end_min_cores: 8,
            mid_range_min_memory_gb: 4.0,
            mid_range_min_cores: 6,
            low_end_advanced_min_memory_gb: 3.0,
            high_end_frame_interval: Duration::from_millis(50),
            mid_range_frame_interval: Duration::from_millis(100),
            low_end_frame_interval: Duration::from_millis(200),
            frame_history_size: 50,
        }
    }
}

impl CapabilityConfig {
    /// Classify hardware into a tier.
    pub fn classify(&self, info: &HardwareInfo) -> PerformanceTier {
        if info.memory_gb >= self.high_end_min_memory_gb
            && info.processor_cores >= self.high_end_min_cores
        {
            PerformanceTier::HighEnd
        } else if info.memory_gb >= self.mid_range_min_memory_gb
            && info.processor_cores >= self.mid_range_min_cores
        {
            PerformanceTier::MidRange
        } else {
            PerformanceTier::LowEnd
        }
    }

    pub fn frame_interval(&self, tier: PerformanceTier) -> Duration {
        match tier {
            PerformanceTier::HighEnd => self.high_end_frame_interval,
            PerformanceTier::MidRange => self.mid_range_frame_interval,
            PerformanceTier::LowEnd => self.low_end_frame_interval,
        }
    }

    /// Build the full capability profile for the given hardware.
    pub fn capabilities_for(&self, info: &HardwareInfo) -> DeviceCapabilities {
        let tier = self.classify(info);
        let (gpu, advanced) = match tier {
            PerformanceTier::HighEnd | PerformanceTier::MidRange => (true, true),
            PerformanceTier::LowEnd => (
                false,
                info.memory_gb >= self.low_end_advanced_min_memory_gb,
            ),
        };

        DeviceCapabilities {
            performance_tier: tier,
            memory_gb: info.memory_gb,
            processor_cores: info.processor_cores,
            has_high_performance_gpu: gpu,
            supports_advanced_ar: advanced,
            recommended_frame_interval: self.frame_interval(tier),
            max_concurrent_operations: tier.max_concurrent_operations(),
        }
    }
}

/// Detects and caches device capabilities.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bodyscan::capability::{CapabilityConfig, CapabilityProfiler, PerformanceTier, StaticProbe};
///
/// let profiler = CapabilityProfiler::new(CapabilityConfig::default(), Arc::new(StaticProbe::new(8.0, 8)));
/// let caps = profiler.detect();
/// assert_eq!(caps.performance_tier, PerformanceTier::HighEnd);
/// ```
pub struct CapabilityProfiler {
    config: CapabilityConfig,
    probe: Arc<dyn DeviceProbe>,
    cached: Mutex<Option<DeviceCapabilities>>,
    timings: Mutex<BoundedHistory<FrameTiming>>,
}

impl std::fmt::Debug for CapabilityProfiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityProfiler")
            .field("config", &self.config)
            .field("cached", &*self.cached.lock())
            .finish_non_exhaustive()
    }
}

impl CapabilityProfiler {
    pub fn new(config: CapabilityConfig, probe: Arc<dyn DeviceProbe>) -> Self {
        let history_size = config.frame_history_size;
        Self {
            config,
            probe,
            cached: Mutex::new(None),
            timings: Mutex::new(BoundedHistory::new(history_size)),
        }
    }

    pub fn config(&self) -> &CapabilityConfig {
        &self.config
    }

    /// Detect device capabilities, probing only on the first call.
    ///
    /// A failing probe yields [`DeviceCapabilities::default_mid_range`]; the
    /// fallback is cached too, so later calls stay consistent until
    /// [`reset`](Self::reset).
    pub fn detect(&self) -> DeviceCapabilities {
        let mut cached = self.cached.lock();
        if let Some(caps) = cached.as_ref() {
            return caps.clone();
        }

        let caps = match self.probe.probe() {
            Ok(info) => {
                let caps = self.config.capabilities_for(&info);
                tracing::info!(
                    tier = %caps.performance_tier,
                    memory_gb = format!("{:.1}", caps.memory_gb),
                    cores = caps.processor_cores,
                    frame_interval_ms = caps.recommended_frame_interval.as_millis() as u64,
                    "Device capabilities detected"
                );
                caps
            }
            Err(e) => {
                tracing::warn!(error = %e, "Capability probe failed, using mid-range defaults");
                DeviceCapabilities::default_mid_range()
            }
        };

        *cached = Some(caps.clone());
        caps
    }

    /// Cached capabilities without triggering detection.
    pub fn cached(&self) -> Option<DeviceCapabilities> {
        self.cached.lock().clone()
    }

    /// Clear the cached profile and the frame-timing window.
    pub fn reset(&self) {
        *self.cached.lock() = None;
        self.timings.lock().clear();
        tracing::debug!("Capability cache reset");
    }

    pub fn record_frame_timing(&self, timing: FrameTiming) {
        self.timings.lock().push(timing);
    }

    pub fn frame_timings(&self) -> Vec<FrameTiming> {
        self.timings.lock().snapshot()
    }

    /// Frame interval adapted to recently observed frame times.
    ///
    /// Slow frames (above 120% of the recommended interval) stretch the
    /// interval by half, capped at 300ms. Fast frames (below 70%) shrink it
    /// by a fifth, floored at 30ms.
    pub fn optimal_frame_interval(&self) -> Duration {
        let recommended = self.detect().recommended_frame_interval;
        let timings = self.timings.lock();
        if timings.len() < MIN_SAMPLES_FOR_ADAPTATION {
            return recommended;
        }

        let avg_ms = timings
            .iter()
            .map(|t| t.frame_processing_time.as_secs_f64() * 1000.0)
            .sum::<f64>()
            / timings.len() as f64;
        let rec_ms = recommended.as_secs_f64() * 1000.0;

        let adapted_ms = if avg_ms > rec_ms * 1.2 {
            (rec_ms * 1.5).min(300.0)
        } else if avg_ms < rec_ms * 0.7 {
            (rec_ms * 0.8).max(30.0)
        } else {
            rec_ms
        };

        Duration::from_millis(adapted_ms.round() as u64)
    }

    /// Memory budget scaled by device memory (4GB is the reference point).
    pub fn optimal_memory_bounds(&self) -> MemoryBounds {
        let caps = self.detect();
        let multiplier = (caps.memory_gb / 4.0).min(2.0);
        MemoryBounds {
            max_cache_size_mb: 50.0 * multiplier,
            max_history_entries: (100.0 * multiplier).floor() as usize,
            gc_threshold: 0.8,
        }
    }

    /// Aggregate frame-timing statistics, or `None` before any sample.
    pub fn performance_stats(&self) -> Option<FrameTimingStats> {
        let timings = self.timings.lock();
        if timings.is_empty() {
            return None;
        }

        let n = timings.len() as f64;
        let frame_ms: Vec<f64> = timings
            .iter()
            .map(|t| t.frame_processing_time.as_secs_f64() * 1000.0)
            .collect();
        let average_frame_ms = frame_ms.iter().sum::<f64>() / n;
        let average_memory_usage_mb = timings.iter().map(|t| t.memory_usage_mb).sum::<f64>() / n;
        let average_cpu_usage_ratio = timings.iter().map(|t| t.cpu_usage_ratio).sum::<f64>() / n;

        Some(FrameTimingStats {
            average_frame_time: Duration::from_secs_f64(average_frame_ms / 1000.0),
            average_memory_usage_mb,
            average_cpu_usage_ratio,
            trend: frame_time_trend(&frame_ms),
            sample_count: timings.len(),
        })
    }
}

/// Compare the newest window against the one before it.
fn frame_time_trend(frame_ms: &[f64]) -> PerformanceTrend {
    if frame_ms.len() < TREND_WINDOW * 2 {
        return PerformanceTrend::Stable;
    }

    let len = frame_ms.len();
    let recent = &frame_ms[len - TREND_WINDOW..];
    let older = &frame_ms[len - TREND_WINDOW * 2..len - TREND_WINDOW];
    let recent_avg = recent.iter().sum::<f64>() / TREND_WINDOW as f64;
    let older_avg = older.iter().sum::<f64>() / TREND_WINDOW as f64;
    if older_avg <= f64::EPSILON {
        return PerformanceTrend::Stable;
    }

    let change = (recent_avg - older_avg) / older_avg;
    if change > 0.1 {
        PerformanceTrend::Degrading
    } else if change < -0.1 {
        PerformanceTrend::Improving
    } else {
        PerformanceTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::super::probe::{ProbeError, StaticProbe};
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        calls: AtomicUsize,
        info: HardwareInfo,
    }

    impl DeviceProbe for CountingProbe {
        fn probe(&self) -> Result<HardwareInfo, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.info)
        }
    }

    struct FailingProbe;

    impl DeviceProbe for FailingProbe {
        fn probe(&self) -> Result<HardwareInfo, ProbeError> {
            Err(ProbeError::Unrecognised("no hardware".to_string()))
        }
    }

    fn create_test_profiler(memory_gb: f64, cores: u32) -> CapabilityProfiler {
        CapabilityProfiler::new(
            CapabilityConfig::default(),
            Arc::new(StaticProbe::new(memory_gb, cores)),
        )
    }

    fn timing(ms: u64) -> FrameTiming {
        FrameTiming {
            frame_processing_time: Duration::from_millis(ms),
            memory_usage_mb: 200.0,
            cpu_usage_ratio: 0.5,
        }
    }

    #[test]
    fn test_tier_classification() {
        assert_eq!(
            create_test_profiler(8.0, 8).detect().performance_tier,
            PerformanceTier::HighEnd
        );
        assert_eq!(
            create_test_profiler(4.0, 6).detect().performance_tier,
            PerformanceTier::MidRange
        );
        // Plenty of memory but too few cores
        assert_eq!(
            create_test_profiler(8.0, 4).detect().performance_tier,
            PerformanceTier::LowEnd
        );
    }

    #[test]
    fn test_low_end_capabilities() {
        let caps = create_test_profiler(3.0, 4).detect();
        assert_eq!(caps.performance_tier, PerformanceTier::LowEnd);
        assert!(!caps.has_high_performance_gpu);
        assert!(caps.supports_advanced_ar);
        assert_eq!(caps.recommended_frame_interval, Duration::from_millis(200));
        assert_eq!(caps.max_concurrent_operations, 2);

        let caps = create_test_profiler(2.0, 4).detect();
        assert!(!caps.supports_advanced_ar);
    }

    #[test]
    fn test_detect_is_cached() {
        let probe = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
            info: HardwareInfo {
                memory_gb: 6.0,
                processor_cores: 8,
            },
        });
        let profiler = CapabilityProfiler::new(CapabilityConfig::default(), probe.clone());

        let first = profiler.detect();
        let second = profiler.detect();
        assert_eq!(first, second);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        profiler.reset();
        assert!(profiler.cached().is_none());
        profiler.detect();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_probe_failure_falls_back_to_mid_range() {
        let profiler = CapabilityProfiler::new(CapabilityConfig::default(), Arc::new(FailingProbe));
        assert_eq!(profiler.detect(), DeviceCapabilities::default_mid_range());
    }

    #[test]
    fn test_optimal_frame_interval_needs_samples() {
        let profiler = create_test_profiler(4.0, 6);
        for _ in 0..4 {
            profiler.record_frame_timing(timing(500));
        }
        assert_eq!(profiler.optimal_frame_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_optimal_frame_interval_slows_down() {
        let profiler = create_test_profiler(4.0, 6);
        for _ in 0..5 {
            profiler.record_frame_timing(timing(150));
        }
        assert_eq!(profiler.optimal_frame_interval(), Duration::from_millis(150));

        let profiler = create_test_profiler(2.0, 2);
        for _ in 0..5 {
            profiler.record_frame_timing(timing(400));
        }
        // 200 * 1.5 = 300, capped at 300
        assert_eq!(profiler.optimal_frame_interval(), Duration::from_millis(300));
    }

    #[test]
    fn test_optimal_frame_interval_speeds_up() {
        let profiler = create_test_profiler(8.0, 8);
        for _ in 0..5 {
            profiler.record_frame_timing(timing(10));
        }
        // 50 * 0.8 = 40
        assert_eq!(profiler.optimal_frame_interval(), Duration::from_millis(40));
    }

    #[test]
    fn test_memory_bounds_scale_with_memory() {
        let bounds = create_test_profiler(4.0, 6).optimal_memory_bounds();
        assert_eq!(bounds.max_cache_size_mb, 50.0);
        assert_eq!(bounds.max_history_entries, 100);

        let bounds = create_test_profiler(16.0, 8).optimal_memory_bounds();
        assert_eq!(bounds.max_cache_size_mb, 100.0);
        assert_eq!(bounds.max_history_entries, 200);
    }

    #[test]
    fn test_frame_history_is_bounded() {
        let profiler = create_test_profiler(4.0, 6);
        for i in 0..60 {
            profiler.record_frame_timing(timing(i));
        }
        let timings = profiler.frame_timings();
        assert_eq!(timings.len(), 50);
        assert_eq!(timings[0].frame_processing_time, Duration::from_millis(10));
    }

    #[test]
    fn test_performance_stats_trend() {
        let profiler = create_test_profiler(4.0, 6);
        assert!(profiler.performance_stats().is_none());

        for _ in 0..10 {
            profiler.record_frame_timing(timing(50));
        }
        for _ in 0..10 {
            profiler.record_frame_timing(timing(80));
        }
        let stats = profiler.performance_stats().unwrap();
        assert_eq!(stats.trend, PerformanceTrend::Degrading);
        assert_eq!(stats.sample_count, 20);

        for _ in 0..10 {
            profiler.record_frame_timing(timing(40));
        }
        assert_eq!(
            profiler.performance_stats().unwrap().trend,
            PerformanceTrend::Improving
        );
    }
}
