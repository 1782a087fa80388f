//! Core modules initialized at startup, and the accuracy probe.

use std::sync::Arc;

use super::error::StartupError;
use crate::calibration::CalibrationEngine;
use crate::detection::DetectionPipeline;
use crate::performance::{PerformanceMonitor, PerformanceOptimizer, TickObserver};
use crate::resilience::ResilienceLayer;
use crate::validation::AccuracyValidator;
use crate::BoxFuture;

/// A subsystem the coordinator brings up in order.
///
/// A failing critical module sends startup down the degraded path. A
/// failing non-critical module only adds a warning.
pub trait CoreModule: Send + Sync {
    fn name(&self) -> &str;

    fn critical(&self) -> bool;

    fn initialize(&self) -> BoxFuture<'_, Result<(), StartupError>>;
}

/// Decides whether measurement accuracy survived startup.
pub trait AccuracyProbe: Send + Sync {
    /// Full check after every module initialized. An error triggers the
    /// degraded path.
    fn verify(&self) -> BoxFuture<'_, Result<bool, StartupError>>;

    /// Whether minimal measurement capability is still available after a
    /// failed startup.
    fn minimal_capability(&self) -> BoxFuture<'_, bool>;
}

pub struct DetectionModule {
    pipeline: Arc<DetectionPipeline>,
}

impl DetectionModule {
    pub fn new(pipeline: Arc<DetectionPipeline>) -> Self {
        Self { pipeline }
    }
}

impl CoreModule for DetectionModule {
    fn name(&self) -> &str {
        "detection"
    }

    fn critical(&self) -> bool {
        true
    }

    fn initialize(&self) -> BoxFuture<'_, Result<(), StartupError>> {
        Box::pin(async move {
            let names = self.pipeline.strategy_names();
            // The last resort alone cannot measure anything.
            if names.len() < 2 {
                return Err(StartupError::module_failed(
                    self.name(),
                    "no detection strategies registered",
                ));
            }
            tracing::debug!(strategies = %names.join(" → "), "Detection chain ready");
            Ok(())
        })
    }
}

pub struct ValidationModule {
    validator: Arc<AccuracyValidator>,
}

impl ValidationModule {
    pub fn new(validator: Arc<AccuracyValidator>) -> Self {
        Self { validator }
    }
}

impl CoreModule for ValidationModule {
    fn name(&self) -> &str {
        "validation"
    }

    fn critical(&self) -> bool {
        true
    }

    fn initialize(&self) -> BoxFuture<'_, Result<(), StartupError>> {
        Box::pin(async move {
            let config = self.validator.config();
            let ranges_ok = config.shoulder_width_range.min < config.shoulder_width_range.max
                && config.height_range.min < config.height_range.max
                && config.shoulder_width_range.min > 0.0;
            if !ranges_ok {
                return Err(StartupError::module_failed(
                    self.name(),
                    "plausible measurement ranges are empty",
                ));
            }
            if config.expected_ratio <= 0.0 || config.smoothing_window == 0 {
                return Err(StartupError::module_failed(
                    self.name(),
                    "proportion or smoothing settings are invalid",
                ));
            }
            Ok(())
        })
    }
}

pub struct CalibrationModule {
    engine: Arc<CalibrationEngine>,
}

impl CalibrationModule {
    pub fn new(engine: Arc<CalibrationEngine>) -> Self {
        Self { engine }
    }
}

impl CoreModule for CalibrationModule {
    fn name(&self) -> &str {
        "calibration"
    }

    fn critical(&self) -> bool {
        false
    }

    fn initialize(&self) -> BoxFuture<'_, Result<(), StartupError>> {
        Box::pin(async move {
            self.engine
                .config()
                .validate()
                .map_err(|e| StartupError::module_failed(self.name(), e.to_string()))?;
            tracing::debug!(profiles = self.engine.store().len(), "Calibration ready");
            Ok(())
        })
    }
}

/// Starts the performance monitor with the optimizer attached.
pub struct PerformanceModule {
    monitor: Arc<PerformanceMonitor>,
    optimizer: Arc<PerformanceOptimizer>,
}

impl PerformanceModule {
    pub fn new(monitor: Arc<PerformanceMonitor>, optimizer: Arc<PerformanceOptimizer>) -> Self {
        Self { monitor, optimizer }
    }
}

impl CoreModule for PerformanceModule {
    fn name(&self) -> &str {
        "performance"
    }

    fn critical(&self) -> bool {
        false
    }

    fn initialize(&self) -> BoxFuture<'_, Result<(), StartupError>> {
        Box::pin(async move {
            if self.monitor.is_active() {
                return Ok(());
            }
            let observer: Arc<dyn TickObserver> = self.optimizer.clone();
            if self.monitor.start(Some(observer)).await {
                Ok(())
            } else {
                Err(StartupError::module_failed(self.name(), "monitor did not start"))
            }
        })
    }
}

/// Accuracy holds while at least one chained detection strategy is usable,
/// that is, registered and not behind an open breaker.
pub struct DetectionAccuracyProbe {
    pipeline: Arc<DetectionPipeline>,
    resilience: Option<Arc<ResilienceLayer>>,
}

impl DetectionAccuracyProbe {
    pub fn new(pipeline: Arc<DetectionPipeline>, resilience: Option<Arc<ResilienceLayer>>) -> Self {
        Self {
            pipeline,
            resilience,
        }
    }

    fn usable_strategies(&self) -> usize {
        let mut names = self.pipeline.strategy_names();
        // Drop the last resort.
        names.pop();
        names
            .iter()
            .filter(|name| {
                self.resilience
                    .as_ref()
                    .map(|r| !r.breaker(&format!("detect.{name}")).is_open())
                    .unwrap_or(true)
            })
            .count()
    }
}

impl AccuracyProbe for DetectionAccuracyProbe {
    fn verify(&self) -> BoxFuture<'_, Result<bool, StartupError>> {
        Box::pin(async move { Ok(self.usable_strategies() > 0) })
    }

    fn minimal_capability(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.usable_strategies() > 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationConfig, ProfileStore};
    use crate::detection::{ArTrackingStrategy, DetectionConfig, SyntheticBodyBackend};
    use crate::resilience::CircuitBreakerConfig;
    use crate::validation::{AccuracyConfig, PlausibleRange};

    fn pipeline_with_backend() -> Arc<DetectionPipeline> {
        let backend = Arc::new(SyntheticBodyBackend::new(175.0, 44.0));
        Arc::new(
            DetectionPipeline::builder(DetectionConfig::default())
                .with_strategy(Arc::new(ArTrackingStrategy::new("ar", backend)))
                .build(),
        )
    }

    #[tokio::test]
    async fn test_detection_module_needs_a_strategy() {
        let empty = Arc::new(DetectionPipeline::builder(DetectionConfig::default()).build());
        assert!(DetectionModule::new(empty).initialize().await.is_err());
        assert!(DetectionModule::new(pipeline_with_backend())
            .initialize()
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_validation_module_rejects_empty_ranges() {
        let validator = Arc::new(AccuracyValidator::new(AccuracyConfig {
            height_range: PlausibleRange::new(200.0, 150.0),
            ..Default::default()
        }));
        let err = ValidationModule::new(validator).initialize().await.unwrap_err();
        assert!(matches!(err, StartupError::ModuleFailed { ref module, .. } if module == "validation"));
    }

    #[tokio::test]
    async fn test_calibration_module_rejects_inverted_scale_bounds() {
        let config = CalibrationConfig::default().with_scale_bounds(3.0, 2.0);
        let engine = Arc::new(CalibrationEngine::new(config, Arc::new(ProfileStore::new())));
        let err = CalibrationModule::new(engine).initialize().await.unwrap_err();
        assert!(matches!(err, StartupError::ModuleFailed { ref module, .. } if module == "calibration"));

        let healthy = Arc::new(CalibrationEngine::default());
        assert!(CalibrationModule::new(healthy).initialize().await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_sees_open_breakers() {
        let pipeline = pipeline_with_backend();
        let resilience = Arc::new(ResilienceLayer::new(CircuitBreakerConfig::default()));
        let probe = DetectionAccuracyProbe::new(pipeline, Some(Arc::clone(&resilience)));
        assert!(probe.verify().await.unwrap());

        let breaker = resilience.breaker("detect.ar");
        for _ in 0..3 {
            let _ = breaker
                .execute(|| async { Err::<(), _>("backend down") })
                .await;
        }
        assert!(!probe.minimal_capability().await);
        assert!(!probe.verify().await.unwrap());
    }
}
