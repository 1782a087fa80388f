//! Single-flight startup sequencing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;

use super::error::StartupError;
use super::modules::{AccuracyProbe, CoreModule};
use crate::capability::{CapabilityProfiler, DeviceCapabilities};
use crate::BoxFuture;

/// Feature name reported when the device supports advanced tracking.
pub const ADVANCED_FEATURES: &str = "advanced_features";

#[derive(Debug, Clone, PartialEq)]
pub struct StartupConfig {
    /// Probe for minimal capability when initialization fails.
    pub preserve_accuracy: bool,
    pub enable_advanced_features: bool,
    /// Initialize the `calibration` module.
    pub maintain_calibration: bool,
    /// Initialize the `performance` module, which starts monitoring.
    pub optimize_performance: bool,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            preserve_accuracy: true,
            enable_advanced_features: true,
            maintain_calibration: true,
            optimize_performance: true,
        }
    }
}

impl StartupConfig {
    pub fn with_optimize_performance(mut self, enabled: bool) -> Self {
        self.optimize_performance = enabled;
        self
    }

    pub fn with_maintain_calibration(mut self, enabled: bool) -> Self {
        self.maintain_calibration = enabled;
        self
    }

    fn wants(&self, module: &str) -> bool {
        match module {
            "calibration" => self.maintain_calibration,
            "performance" => self.optimize_performance,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStatus {
    Ready,
    /// Something failed but measurements are still trustworthy.
    Degraded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartupReport {
    pub success: bool,
    pub accuracy_preserved: bool,
    pub features_enabled: Vec<String>,
    pub warnings: Vec<String>,
    pub capabilities: Option<DeviceCapabilities>,
    pub elapsed: Duration,
}

impl StartupReport {
    pub fn status(&self) -> StartupStatus {
        match (self.success, self.accuracy_preserved) {
            (_, false) => StartupStatus::Failed,
            (true, true) => StartupStatus::Ready,
            (false, true) => StartupStatus::Degraded,
        }
    }

    pub fn into_result(self) -> Result<StartupReport, StartupError> {
        match self.status() {
            StartupStatus::Ready => Ok(self),
            StartupStatus::Degraded => Err(StartupError::InitializationDegraded {
                warnings: self.warnings,
            }),
            StartupStatus::Failed => Err(StartupError::AccuracyLost {
                warnings: self.warnings,
            }),
        }
    }
}

enum InitState {
    NotStarted,
    InFlight(Shared<BoxFuture<'static, StartupReport>>),
    Done(StartupReport),
}

struct Inner {
    config: StartupConfig,
    capabilities: Arc<CapabilityProfiler>,
    modules: Vec<Arc<dyn CoreModule>>,
    probe: Arc<dyn AccuracyProbe>,
}

/// Brings the core modules up once.
///
/// ```text
/// capabilities ──► modules (in order) ──► accuracy check ──► Ready
///                        │ critical failure        │ error
///                        └──────────┬──────────────┘
///                                   ▼
///                     minimal-capability probe ──► Degraded / Failed
/// ```
///
/// Concurrent callers of [`initialize`](Self::initialize) await the same
/// run. Once it finishes every later call returns the cached report.
pub struct StartupCoordinator {
    inner: Arc<Inner>,
    state: Mutex<InitState>,
}

impl StartupCoordinator {
    pub fn new(
        config: StartupConfig,
        capabilities: Arc<CapabilityProfiler>,
        modules: Vec<Arc<dyn CoreModule>>,
        probe: Arc<dyn AccuracyProbe>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                capabilities,
                modules,
                probe,
            }),
            state: Mutex::new(InitState::NotStarted),
        }
    }

    pub fn config(&self) -> &StartupConfig {
        &self.inner.config
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.state.lock(), InitState::Done(_))
    }

    /// The cached report, if startup has finished.
    pub fn report(&self) -> Option<StartupReport> {
        match &*self.state.lock() {
            InitState::Done(report) => Some(report.clone()),
            _ => None,
        }
    }

    pub async fn initialize(&self) -> StartupReport {
        let run = {
            let mut state = self.state.lock();
            match &*state {
                InitState::Done(report) => return report.clone(),
                InitState::InFlight(run) => run.clone(),
                InitState::NotStarted => {
                    let inner = Arc::clone(&self.inner);
                    let fut: BoxFuture<'static, StartupReport> =
                        Box::pin(async move { inner.run().await });
                    let run = fut.shared();
                    *state = InitState::InFlight(run.clone());
                    run
                }
            }
        };

        let report = run.await;
        let mut state = self.state.lock();
        if matches!(*state, InitState::InFlight(_)) {
            *state = InitState::Done(report.clone());
        }
        report
    }
}

impl Inner {
    async fn run(&self) -> StartupReport {
        let started = Instant::now();
        tracing::info!(modules = self.modules.len(), "Starting initialization");

        let mut warnings = Vec::new();
        let mut features = Vec::new();

        let caps = self.capabilities.detect();
        if self.config.enable_advanced_features {
            if caps.supports_advanced_ar {
                features.push(ADVANCED_FEATURES.to_string());
            } else {
                warnings.push("Advanced features not supported on this device".to_string());
            }
        }

        let outcome = match self.init_modules(&mut features, &mut warnings).await {
            Ok(()) => self.probe.verify().await,
            Err(e) => Err(e),
        };

        let (success, accuracy_preserved) = match outcome {
            Ok(true) => (true, true),
            Ok(false) => {
                warnings.push("Measurement accuracy could not be verified".to_string());
                (false, self.fallback().await)
            }
            Err(e) => {
                warnings.push(format!("Initialization failed: {e}"));
                (false, self.fallback().await)
            }
        };

        let report = StartupReport {
            success,
            accuracy_preserved,
            features_enabled: features,
            warnings,
            capabilities: Some(caps),
            elapsed: started.elapsed(),
        };

        match report.status() {
            StartupStatus::Ready => tracing::info!(
                features = %report.features_enabled.join(", "),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Initialization complete"
            ),
            StartupStatus::Degraded => tracing::warn!(
                warnings = report.warnings.len(),
                "Initialization degraded, accuracy preserved"
            ),
            StartupStatus::Failed => tracing::warn!(
                warnings = report.warnings.len(),
                "Initialization failed, accuracy lost"
            ),
        }
        report
    }

    async fn init_modules(
        &self,
        features: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> Result<(), StartupError> {
        for module in &self.modules {
            if !self.config.wants(module.name()) {
                tracing::debug!(module = %module.name(), "Module disabled");
                continue;
            }
            match module.initialize().await {
                Ok(()) => features.push(module.name().to_string()),
                Err(e) if module.critical() => return Err(e),
                Err(e) => {
                    tracing::warn!(module = %module.name(), error = %e, "Optional module failed");
                    warnings.push(e.to_string());
                }
            }
        }
        Ok(())
    }

    async fn fallback(&self) -> bool {
        if !self.config.preserve_accuracy {
            return false;
        }
        self.probe.minimal_capability().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityConfig, StaticProbe};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingModule {
        name: &'static str,
        critical: bool,
        fail: bool,
        calls: AtomicUsize,
    }

    impl CountingModule {
        fn new(name: &'static str, critical: bool, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                critical,
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl CoreModule for CountingModule {
        fn name(&self) -> &str {
            self.name
        }

        fn critical(&self) -> bool {
            self.critical
        }

        fn initialize(&self) -> BoxFuture<'_, Result<(), StartupError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                if self.fail {
                    Err(StartupError::module_failed(self.name, "boom"))
                } else {
                    Ok(())
                }
            })
        }
    }

    struct FixedProbe {
        verified: Result<bool, StartupError>,
        minimal: AtomicBool,
    }

    impl FixedProbe {
        fn new(verified: Result<bool, StartupError>, minimal: bool) -> Arc<Self> {
            Arc::new(Self {
                verified,
                minimal: AtomicBool::new(minimal),
            })
        }
    }

    impl AccuracyProbe for FixedProbe {
        fn verify(&self) -> BoxFuture<'_, Result<bool, StartupError>> {
            let verified = self.verified.clone();
            Box::pin(async move { verified })
        }

        fn minimal_capability(&self) -> BoxFuture<'_, bool> {
            Box::pin(async move { self.minimal.load(Ordering::SeqCst) })
        }
    }

    fn create_test_coordinator(
        modules: Vec<Arc<dyn CoreModule>>,
        probe: Arc<dyn AccuracyProbe>,
        memory_gb: f64,
    ) -> StartupCoordinator {
        let profiler = Arc::new(CapabilityProfiler::new(
            CapabilityConfig::default(),
            Arc::new(StaticProbe::new(memory_gb, 8)),
        ));
        StartupCoordinator::new(StartupConfig::default(), profiler, modules, probe)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let module = CountingModule::new("detection", true, false);
        let coordinator = Arc::new(create_test_coordinator(
            vec![module.clone()],
            FixedProbe::new(Ok(true), true),
            8.0,
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&coordinator);
                tokio::spawn(async move { c.initialize().await })
            })
            .collect();
        let reports = futures::future::join_all(handles).await;

        assert_eq!(module.calls.load(Ordering::SeqCst), 1);
        let first = reports[0].as_ref().unwrap();
        for report in &reports {
            assert_eq!(report.as_ref().unwrap(), first);
        }
        assert!(coordinator.is_initialized());
    }

    #[tokio::test]
    async fn test_later_calls_return_cached_report() {
        let module = CountingModule::new("detection", true, false);
        let coordinator =
            create_test_coordinator(vec![module.clone()], FixedProbe::new(Ok(true), true), 8.0);
        assert!(!coordinator.is_initialized());

        let first = coordinator.initialize().await;
        let second = coordinator.initialize().await;
        assert_eq!(first, second);
        assert_eq!(module.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.report(), Some(first));
    }

    #[tokio::test]
    async fn test_ready_report_lists_features() {
        let coordinator = create_test_coordinator(
            vec![
                CountingModule::new("detection", true, false),
                CountingModule::new("validation", true, false),
            ],
            FixedProbe::new(Ok(true), true),
            8.0,
        );
        let report = coordinator.initialize().await;

        assert_eq!(report.status(), StartupStatus::Ready);
        assert_eq!(
            report.features_enabled,
            vec![
                ADVANCED_FEATURES.to_string(),
                "detection".to_string(),
                "validation".to_string()
            ]
        );
        assert!(report.warnings.is_empty());
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_non_critical_failure_is_a_warning() {
        let coordinator = create_test_coordinator(
            vec![
                CountingModule::new("detection", true, false),
                CountingModule::new("calibration", false, true),
            ],
            FixedProbe::new(Ok(true), true),
            8.0,
        );
        let report = coordinator.initialize().await;

        assert_eq!(report.status(), StartupStatus::Ready);
        assert_eq!(report.warnings, vec!["module 'calibration' failed: boom".to_string()]);
        assert!(!report.features_enabled.contains(&"calibration".to_string()));
    }

    #[tokio::test]
    async fn test_critical_failure_degrades_with_accuracy_preserved() {
        let later = CountingModule::new("validation", true, false);
        let coordinator = create_test_coordinator(
            vec![CountingModule::new("detection", true, true), later.clone()],
            FixedProbe::new(Ok(true), true),
            8.0,
        );
        let report = coordinator.initialize().await;

        assert!(!report.success);
        assert!(report.accuracy_preserved);
        assert_eq!(report.status(), StartupStatus::Degraded);
        assert_eq!(
            report.warnings,
            vec!["Initialization failed: module 'detection' failed: boom".to_string()]
        );
        // Nothing after the failed critical module runs.
        assert_eq!(later.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            report.into_result(),
            Err(StartupError::InitializationDegraded { .. })
        ));
    }

    #[tokio::test]
    async fn test_accuracy_lost_when_probe_fails() {
        let coordinator = create_test_coordinator(
            vec![CountingModule::new("detection", true, false)],
            FixedProbe::new(Err(StartupError::module_failed("probe", "no strategy")), false),
            8.0,
        );
        let report = coordinator.initialize().await;

        assert_eq!(report.status(), StartupStatus::Failed);
        assert!(matches!(report.into_result(), Err(StartupError::AccuracyLost { .. })));
    }

    #[tokio::test]
    async fn test_disabled_modules_are_skipped() {
        let calibration = CountingModule::new("calibration", false, false);
        let profiler = Arc::new(CapabilityProfiler::new(
            CapabilityConfig::default(),
            Arc::new(StaticProbe::new(8.0, 8)),
        ));
        let coordinator = StartupCoordinator::new(
            StartupConfig::default().with_maintain_calibration(false),
            profiler,
            vec![calibration.clone()],
            FixedProbe::new(Ok(true), true),
        );
        let report = coordinator.initialize().await;

        assert_eq!(calibration.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.status(), StartupStatus::Ready);
    }

    #[tokio::test]
    async fn test_unsupported_advanced_features_warn() {
        let coordinator = create_test_coordinator(
            vec![CountingModule::new("detection", true, false)],
            FixedProbe::new(Ok(true), true),
            2.0,
        );
        let report = coordinator.initialize().await;

        assert_eq!(report.status(), StartupStatus::Ready);
        assert!(!report.features_enabled.contains(&ADVANCED_FEATURES.to_string()));
        assert_eq!(report.warnings.len(), 1);
    }
}
