//! Periodic performance monitor.
//!
//! ```text
//!   start() ── baseline sample ── spawn ──► every tick_interval:
//!                                             tick()
//!                                               ├─ sample telemetry
//!                                               ├─ append to history (cap 100)
//!                                               ├─ evaluate alert thresholds (cap 50)
//!                                               └─ TickObserver::on_tick (optimizer)
//!   stop()  ── active = false, cancel, abort (returns immediately)
//! ```
//!
//! Ticks never overlap: a tick that is still running when the next one is
//! due causes that next tick to be skipped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::alerts::AlertThresholds;
use super::telemetry::TelemetrySource;
use super::types::{
    HealthGrade, PerformanceAlert, PerformanceSnapshot, PerformanceStatus, PerformanceTrends,
    Recommendation, RecommendationCategory, Severity, ThermalState, TickReport, TrendDirection,
};
use crate::history::BoundedHistory;

/// Relative change between history halves that counts as a trend.
const TREND_THRESHOLD: f64 = 0.05;

/// Snapshots averaged for recommendations.
const RECOMMENDATION_WINDOW: usize = 5;

/// Snapshots required before recommendations are produced.
const MIN_RECOMMENDATION_SAMPLES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub tick_interval: Duration,
    pub history_size: usize,
    pub alert_history_size: usize,
    /// Alerts younger than this count as active.
    pub active_alert_window: Duration,
    pub thresholds: AlertThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            history_size: 100,
            alert_history_size: 50,
            active_alert_window: Duration::from_secs(30),
            thresholds: AlertThresholds::default(),
        }
    }
}

/// Receives each tick's report inside the tick.
///
/// `history` is the snapshot history after this tick's sample was added,
/// oldest first.
pub trait TickObserver: Send + Sync {
    fn on_tick(&self, report: &TickReport, history: &[PerformanceSnapshot]);
}

struct MonitorState {
    history: BoundedHistory<PerformanceSnapshot>,
    alerts: BoundedHistory<PerformanceAlert>,
    baseline: Option<PerformanceSnapshot>,
}

#[derive(Default)]
struct MonitorTask {
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// Clears the tick-in-progress flag however the tick ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct PerformanceMonitor {
    config: MonitorConfig,
    source: Arc<dyn TelemetrySource>,
    state: Mutex<MonitorState>,
    ticking: AtomicBool,
    active: AtomicBool,
    ticks: AtomicU64,
    skipped_ticks: AtomicU64,
    task: Mutex<MonitorTask>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig, source: Arc<dyn TelemetrySource>) -> Self {
        let state = MonitorState {
            history: BoundedHistory::new(config.history_size),
            alerts: BoundedHistory::new(config.alert_history_size),
            baseline: None,
        };
        Self {
            config,
            source,
            state: Mutex::new(state),
            ticking: AtomicBool::new(false),
            active: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
            task: Mutex::new(MonitorTask::default()),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Ticks completed.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Ticks skipped because the previous one was still running.
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    /// Take one sample and evaluate it.
    ///
    /// Returns `None` when another tick is in progress or telemetry failed.
    pub async fn tick(&self, observer: Option<&dyn TickObserver>) -> Option<TickReport> {
        if self.ticking.swap(true, Ordering::SeqCst) {
            self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Previous monitor tick still running, skipping");
            return None;
        }
        let _guard = TickGuard(&self.ticking);

        let snapshot = match self.source.sample().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Telemetry sample failed");
                return None;
            }
        };

        let alerts = self.config.thresholds.evaluate(&snapshot);
        let history = {
            let mut state = self.state.lock();
            state.history.push(snapshot.clone());
            for alert in &alerts {
                state.alerts.push(alert.clone());
            }
            state.history.snapshot()
        };

        for alert in &alerts {
            tracing::warn!(
                kind = %alert.kind,
                severity = %alert.severity,
                message = %alert.message,
                "Performance alert"
            );
        }
        tracing::debug!(
            frame_rate = snapshot.frame_rate,
            memory = snapshot.memory_usage_ratio,
            cpu = snapshot.cpu_usage_ratio,
            battery = snapshot.battery_level,
            thermal = %snapshot.thermal_state,
            "Monitor tick"
        );

        let report = TickReport { snapshot, alerts };
        if let Some(observer) = observer {
            observer.on_tick(&report, &history);
        }
        self.ticks.fetch_add(1, Ordering::Relaxed);
        Some(report)
    }

    /// Capture a baseline and start ticking in the background.
    ///
    /// Returns `false` if monitoring was already active. Must be called
    /// from within a Tokio runtime.
    pub async fn start(self: &Arc<Self>, observer: Option<Arc<dyn TickObserver>>) -> bool {
        if self.active.swap(true, Ordering::SeqCst) {
            return false;
        }

        let baseline = match self.source.sample().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Baseline sample failed, using defaults");
                PerformanceSnapshot::default()
            }
        };
        {
            let mut state = self.state.lock();
            state.history.push(baseline.clone());
            state.baseline = Some(baseline);
        }

        let mut task = self.task.lock();
        // stop() may have run while the baseline was sampled
        if !self.is_active() {
            return false;
        }
        let token = CancellationToken::new();
        let monitor = Arc::clone(self);
        let loop_token = token.clone();
        task.handle = Some(tokio::spawn(async move {
            monitor.run(observer, loop_token).await;
        }));
        task.token = Some(token);

        tracing::info!(
            interval_ms = self.config.tick_interval.as_millis() as u64,
            "Performance monitoring started"
        );
        true
    }

    async fn run(&self, observer: Option<Arc<dyn TickObserver>>, token: CancellationToken) {
        let period = self.config.tick_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = self.tick(observer.as_deref()) => {}
            }
        }
    }

    /// Stop ticking. `is_active()` is `false` when this returns.
    pub fn stop(&self) {
        let mut task = self.task.lock();
        let was_active = self.active.swap(false, Ordering::SeqCst);
        if let Some(token) = task.token.take() {
            token.cancel();
        }
        if let Some(handle) = task.handle.take() {
            handle.abort();
        }
        if was_active {
            tracing::info!(ticks = self.tick_count(), "Performance monitoring stopped");
        }
    }

    pub fn baseline(&self) -> Option<PerformanceSnapshot> {
        self.state.lock().baseline.clone()
    }

    pub fn latest(&self) -> Option<PerformanceSnapshot> {
        self.state.lock().history.latest().cloned()
    }

    /// Snapshot history, oldest first.
    pub fn snapshots(&self) -> Vec<PerformanceSnapshot> {
        self.state.lock().history.snapshot()
    }

    /// Alert history, oldest first.
    pub fn alerts(&self) -> Vec<PerformanceAlert> {
        self.state.lock().alerts.snapshot()
    }

    /// Alerts raised within the active-alert window.
    pub fn active_alerts(&self) -> Vec<PerformanceAlert> {
        let now = Utc::now();
        let window = self.config.active_alert_window;
        self.state
            .lock()
            .alerts
            .iter()
            .filter(|alert| {
                (now - alert.timestamp)
                    .to_std()
                    .map(|age| age < window)
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.alerts.clear();
    }

    /// Health score of the latest snapshot.
    pub fn status(&self) -> PerformanceStatus {
        let latest = self.latest();
        let active = self.active_alerts();
        let critical = active
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .count();

        let score = latest
            .as_ref()
            .map(snapshot_score)
            .unwrap_or(100.0)
            - 10.0 * critical as f64;
        let score = score.clamp(0.0, 100.0);

        PerformanceStatus {
            grade: HealthGrade::from_score(score),
            score,
            active_alerts: active.len(),
            critical_alerts: critical,
            monitoring: self.is_active(),
            latest,
        }
    }

    /// Compare the older and newer halves of the history per metric.
    pub fn trends(&self) -> PerformanceTrends {
        let history = self.snapshots();
        if history.len() < 2 {
            return PerformanceTrends::default();
        }

        let metric = |f: fn(&PerformanceSnapshot) -> f64| history.iter().map(f).collect::<Vec<_>>();
        let frame_rate = trend(&metric(|s| s.frame_rate), true);
        let memory = trend(&metric(|s| s.memory_usage_ratio), false);
        let cpu = trend(&metric(|s| s.cpu_usage_ratio), false);
        let battery = trend(&metric(|s| s.battery_level), true);

        let all = [frame_rate, memory, cpu, battery];
        let improving = all.iter().filter(|t| **t == TrendDirection::Improving).count();
        let degrading = all.iter().filter(|t| **t == TrendDirection::Degrading).count();
        let overall = if improving > degrading {
            TrendDirection::Improving
        } else if degrading > improving {
            TrendDirection::Degrading
        } else {
            TrendDirection::Stable
        };

        PerformanceTrends {
            frame_rate,
            memory,
            cpu,
            battery,
            overall,
        }
    }

    /// Recommendations from the averages of the most recent snapshots.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let recent: Vec<PerformanceSnapshot> = {
            let state = self.state.lock();
            if state.history.len() < MIN_RECOMMENDATION_SAMPLES {
                return Vec::new();
            }
            state.history.recent(RECOMMENDATION_WINDOW).cloned().collect()
        };

        let n = recent.len() as f64;
        let avg = |f: fn(&PerformanceSnapshot) -> f64| recent.iter().map(f).sum::<f64>() / n;
        let frame_rate = avg(|s| s.frame_rate);
        let memory = avg(|s| s.memory_usage_ratio);
        let battery = avg(|s| s.battery_level);
        let t = &self.config.thresholds;

        let mut recommendations = Vec::new();
        if frame_rate < t.frame_rate.high {
            recommendations.push(Recommendation {
                category: RecommendationCategory::Performance,
                priority: escalate(frame_rate < t.frame_rate.critical),
                title: "Optimize Frame Rate".to_string(),
                description: "Frame rate is below optimal levels".to_string(),
                implementation: "Reduce processing quality or enable adaptive quality scaling"
                    .to_string(),
                estimated_improvement: 20.0,
            });
        }
        if memory > t.memory.high {
            recommendations.push(Recommendation {
                category: RecommendationCategory::Memory,
                priority: escalate(memory > t.memory.critical),
                title: "Optimize Memory Usage".to_string(),
                description: "Memory usage is above optimal levels".to_string(),
                implementation: "Clear caches, reduce history size, optimize image processing"
                    .to_string(),
                estimated_improvement: 30.0,
            });
        }
        if battery < t.battery.high {
            recommendations.push(Recommendation {
                category: RecommendationCategory::Battery,
                priority: escalate(battery < t.battery.critical),
                title: "Optimize Battery Usage".to_string(),
                description: "Battery level is critically low".to_string(),
                implementation: "Reduce processing frequency, disable non-essential features"
                    .to_string(),
                estimated_improvement: 40.0,
            });
        }
        recommendations
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn escalate(critical: bool) -> Severity {
    if critical {
        Severity::Critical
    } else {
        Severity::High
    }
}

/// 100 minus penalties for each stressed metric.
fn snapshot_score(s: &PerformanceSnapshot) -> f64 {
    let mut score = 100.0;

    if s.frame_rate < 20.0 {
        score -= 40.0;
    } else if s.frame_rate < 30.0 {
        score -= 20.0;
    }

    if s.memory_usage_ratio > 0.9 {
        score -= 30.0;
    } else if s.memory_usage_ratio > 0.8 {
        score -= 15.0;
    }

    if s.cpu_usage_ratio > 0.95 {
        score -= 30.0;
    } else if s.cpu_usage_ratio > 0.85 {
        score -= 15.0;
    }

    if s.battery_level < 0.1 {
        score -= 20.0;
    } else if s.battery_level < 0.2 {
        score -= 10.0;
    }

    match s.thermal_state {
        ThermalState::Critical => score -= 30.0,
        ThermalState::Serious => score -= 15.0,
        _ => {}
    }

    score
}

/// Trend of the newer half against the older half.
fn trend(values: &[f64], higher_is_better: bool) -> TrendDirection {
    if values.len() < 2 {
        return TrendDirection::Stable;
    }
    let (older, newer) = values.split_at(values.len() / 2);
    let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
    let older_mean = mean(older);
    if older_mean.abs() < f64::EPSILON {
        return TrendDirection::Stable;
    }

    let change = (mean(newer) - older_mean) / older_mean;
    let change = if higher_is_better { change } else { -change };
    if change > TREND_THRESHOLD {
        TrendDirection::Improving
    } else if change < -TREND_THRESHOLD {
        TrendDirection::Degrading
    } else {
        TrendDirection::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::telemetry::{ScriptedTelemetry, TelemetryError};
    use crate::BoxFuture;

    fn create_test_monitor(snapshots: Vec<PerformanceSnapshot>) -> Arc<PerformanceMonitor> {
        let config = MonitorConfig {
            tick_interval: Duration::from_millis(10),
            ..Default::default()
        };
        Arc::new(PerformanceMonitor::new(
            config,
            Arc::new(ScriptedTelemetry::new(snapshots)),
        ))
    }

    fn snapshot_with_fps(frame_rate: f64) -> PerformanceSnapshot {
        PerformanceSnapshot {
            frame_rate,
            ..Default::default()
        }
    }

    struct SlowTelemetry;

    impl TelemetrySource for SlowTelemetry {
        fn sample(&self) -> BoxFuture<'_, Result<PerformanceSnapshot, TelemetryError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(PerformanceSnapshot::default())
            })
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        calls: AtomicU64,
        last_history_len: AtomicU64,
    }

    impl TickObserver for CountingObserver {
        fn on_tick(&self, _report: &TickReport, history: &[PerformanceSnapshot]) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_history_len
                .store(history.len() as u64, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_tick_records_snapshot_and_alerts() {
        let monitor = create_test_monitor(vec![snapshot_with_fps(15.0)]);
        let report = monitor.tick(None).await.unwrap();

        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].severity, Severity::Critical);
        assert_eq!(monitor.snapshots().len(), 1);
        assert_eq!(monitor.alerts().len(), 1);
        assert_eq!(monitor.active_alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default(), Arc::new(SlowTelemetry));
        let (a, b) = tokio::join!(monitor.tick(None), monitor.tick(None));

        assert!(a.is_some());
        assert!(b.is_none());
        assert_eq!(monitor.skipped_ticks(), 1);
        assert_eq!(monitor.snapshots().len(), 1);

        // The guard is released afterwards
        assert!(monitor.tick(None).await.is_some());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let config = MonitorConfig {
            history_size: 3,
            alert_history_size: 2,
            ..Default::default()
        };
        let source = ScriptedTelemetry::new((0..5).map(|i| snapshot_with_fps(10.0 + i as f64)));
        let monitor = PerformanceMonitor::new(config, Arc::new(source));
        for _ in 0..5 {
            monitor.tick(None).await;
        }

        let fps: Vec<f64> = monitor.snapshots().iter().map(|s| s.frame_rate).collect();
        assert_eq!(fps, vec![12.0, 13.0, 14.0]);
        assert_eq!(monitor.alerts().len(), 2);
    }

    #[tokio::test]
    async fn test_observer_sees_history() {
        let monitor = create_test_monitor(vec![PerformanceSnapshot::default()]);
        let observer = CountingObserver::default();
        monitor.tick(Some(&observer)).await;
        monitor.tick(Some(&observer)).await;

        assert_eq!(observer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(observer.last_history_len.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let monitor = create_test_monitor(vec![PerformanceSnapshot::default()]);
        let observer = Arc::new(CountingObserver::default());

        assert!(monitor.start(Some(observer.clone())).await);
        assert!(!monitor.start(None).await, "already active");
        assert!(monitor.baseline().is_some());

        tokio::time::timeout(Duration::from_secs(2), async {
            while monitor.tick_count() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        monitor.stop();
        assert!(!monitor.is_active());
        let ticks = monitor.tick_count();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(monitor.tick_count(), ticks);
        assert!(observer.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_status_scoring() {
        let healthy = create_test_monitor(vec![PerformanceSnapshot::default()]);
        healthy.tick(None).await;
        let status = healthy.status();
        assert_eq!(status.score, 100.0);
        assert_eq!(status.grade, HealthGrade::Excellent);

        // fps 15 (-40), memory 0.85 (-15), critical fps alert (-10)
        let stressed = create_test_monitor(vec![PerformanceSnapshot {
            frame_rate: 15.0,
            memory_usage_ratio: 0.85,
            ..Default::default()
        }]);
        stressed.tick(None).await;
        let status = stressed.status();
        assert_eq!(status.score, 35.0);
        assert_eq!(status.grade, HealthGrade::Critical);
        assert_eq!(status.critical_alerts, 1);
    }

    #[tokio::test]
    async fn test_trends() {
        let monitor = create_test_monitor(vec![
            PerformanceSnapshot {
                frame_rate: 30.0,
                memory_usage_ratio: 0.4,
                battery_level: 0.8,
                ..Default::default()
            },
            PerformanceSnapshot {
                frame_rate: 30.0,
                memory_usage_ratio: 0.4,
                battery_level: 0.8,
                ..Default::default()
            },
            PerformanceSnapshot {
                frame_rate: 20.0,
                memory_usage_ratio: 0.6,
                battery_level: 0.8,
                ..Default::default()
            },
            PerformanceSnapshot {
                frame_rate: 20.0,
                memory_usage_ratio: 0.6,
                battery_level: 0.8,
                ..Default::default()
            },
        ]);
        for _ in 0..4 {
            monitor.tick(None).await;
        }

        let trends = monitor.trends();
        assert_eq!(trends.frame_rate, TrendDirection::Degrading);
        assert_eq!(trends.memory, TrendDirection::Degrading);
        assert_eq!(trends.battery, TrendDirection::Stable);
        assert_eq!(trends.overall, TrendDirection::Degrading);
        assert_eq!(trends.advice().len(), 2);
    }

    #[tokio::test]
    async fn test_recommendations_need_three_samples() {
        let monitor = create_test_monitor(vec![PerformanceSnapshot {
            frame_rate: 18.0,
            battery_level: 0.08,
            ..Default::default()
        }]);
        monitor.tick(None).await;
        monitor.tick(None).await;
        assert!(monitor.recommendations().is_empty());

        monitor.tick(None).await;
        let recommendations = monitor.recommendations();
        assert_eq!(recommendations.len(), 2);
        assert_eq!(recommendations[0].category, RecommendationCategory::Performance);
        assert_eq!(recommendations[0].priority, Severity::Critical);
        assert_eq!(recommendations[1].category, RecommendationCategory::Battery);
        assert_eq!(recommendations[1].priority, Severity::High);
    }
}
