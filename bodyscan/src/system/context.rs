//! The measurement system and its builder.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use super::error::MeasurementError;
use crate::calibration::{CalibrationEngine, ProfileStore};
use crate::capability::{CapabilityProfiler, DeviceProbe, FrameTiming, SystemProbe};
use crate::config::ConfigFile;
use crate::detection::{
    ArTrackingStrategy, ContourStrategy, DetectionPipeline, DetectionStrategy, EdgeStrategy,
    Frame, LandmarkBackend, SkinToneStrategy,
};
use crate::measurement::{
    CalibratedMeasurement, MeasurementExtractor, ProportionalEstimate, Quality,
};
use crate::performance::{
    PerformanceMonitor, PerformanceOptimizer, Predictor, SyntheticTelemetry, TelemetrySource,
    TuningState, DEFAULT_HORIZON,
};
use crate::resilience::ResilienceLayer;
use crate::startup::{
    CalibrationModule, CoreModule, DetectionAccuracyProbe, DetectionModule, PerformanceModule,
    StartupCoordinator, ValidationModule,
};
use crate::validation::{AccuracyValidator, ValidationResult};

/// Everything `measure` learned about one frame.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementReport {
    pub user_id: String,
    pub measurement: CalibratedMeasurement,
    /// Strategy that produced the landmarks.
    pub method: String,
    pub detection_confidence: f64,
    /// No strategy cleared the threshold; the last resort answered.
    pub detection_exhausted: bool,
    pub valid: bool,
    pub corrections_applied: usize,
    pub profile_version: Option<u32>,
}

/// Owns every subsystem and wires them together.
///
/// ```text
/// Frame ─► DetectionPipeline ─► MeasurementExtractor ─► AccuracyValidator
///              ▲ tuning                                        │ corrections
///              │                                               ▼
/// PerformanceMonitor ─► PerformanceOptimizer      CalibrationEngine ─► report
/// ```
pub struct MeasurementSystem {
    config: ConfigFile,
    capabilities: Arc<CapabilityProfiler>,
    resilience: Arc<ResilienceLayer>,
    tuning: Arc<TuningState>,
    pipeline: Arc<DetectionPipeline>,
    extractor: MeasurementExtractor,
    validator: Arc<AccuracyValidator>,
    calibration: Arc<CalibrationEngine>,
    monitor: Arc<PerformanceMonitor>,
    optimizer: Arc<PerformanceOptimizer>,
    startup: StartupCoordinator,
}

impl MeasurementSystem {
    pub fn builder(config: ConfigFile) -> MeasurementSystemBuilder {
        MeasurementSystemBuilder::new(config)
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn capabilities(&self) -> &Arc<CapabilityProfiler> {
        &self.capabilities
    }

    pub fn resilience(&self) -> &Arc<ResilienceLayer> {
        &self.resilience
    }

    pub fn tuning(&self) -> &Arc<TuningState> {
        &self.tuning
    }

    pub fn pipeline(&self) -> &Arc<DetectionPipeline> {
        &self.pipeline
    }

    pub fn validator(&self) -> &Arc<AccuracyValidator> {
        &self.validator
    }

    pub fn calibration(&self) -> &Arc<CalibrationEngine> {
        &self.calibration
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn optimizer(&self) -> &Arc<PerformanceOptimizer> {
        &self.optimizer
    }

    pub fn startup(&self) -> &StartupCoordinator {
        &self.startup
    }

    /// Measure the user in one frame.
    ///
    /// An exhausted detection chain still produces a report; its confidence
    /// and quality are low and a warning says so.
    pub async fn measure(
        &self,
        user_id: &str,
        frame: &Frame,
    ) -> Result<MeasurementReport, MeasurementError> {
        let started = Instant::now();

        let detection = self.pipeline.detect(frame).await;
        let landmarks = match (&detection.landmarks, detection.detected) {
            (Some(landmarks), true) => landmarks,
            _ => {
                return Err(MeasurementError::NoBodyDetected {
                    sequence: frame.sequence,
                })
            }
        };
        let raw = self.extractor.extract(landmarks).ok_or_else(|| {
            MeasurementError::LandmarksIncomplete {
                method: detection.method.clone(),
            }
        })?;

        let ValidationResult {
            is_valid,
            confidence: validated_confidence,
            corrections,
            mut warnings,
            quality: validated_quality,
            ..
        } = self.validator.validate(&raw, raw.confidence);
        let corrected = self.validator.apply_corrections(&raw, &corrections);
        let outcome = self.calibration.apply_user_calibration(user_id, &corrected);
        let calibrated = outcome.measurement;
        let estimate = ProportionalEstimate::from_height(calibrated.height_cm);

        if detection.exhausted {
            warnings.push(format!(
                "Low-confidence detection: no strategy reached {:.2}",
                self.pipeline.config().confidence_threshold
            ));
        }

        let measurement = CalibratedMeasurement {
            height_cm: calibrated.height_cm,
            shoulder_width_cm: calibrated.shoulder_width_cm,
            chest_cm: estimate.chest_cm,
            waist_cm: estimate.waist_cm,
            hips_cm: estimate.hips_cm,
            confidence: calibrated.confidence.min(validated_confidence),
            calibration_applied: outcome.applied,
            quality: combined_quality(detection.quality, validated_quality),
            warnings,
            timestamp: Utc::now(),
        };

        let latest = self.monitor.latest();
        self.capabilities.record_frame_timing(FrameTiming {
            frame_processing_time: started.elapsed(),
            memory_usage_mb: latest.as_ref().map(|s| s.memory_used_mb).unwrap_or(0.0),
            cpu_usage_ratio: latest.as_ref().map(|s| s.cpu_usage_ratio).unwrap_or(0.0),
        });

        tracing::debug!(
            user = %user_id,
            frame = frame.sequence,
            method = %detection.method,
            height_cm = measurement.height_cm,
            shoulder_cm = measurement.shoulder_width_cm,
            confidence = measurement.confidence,
            quality = %measurement.quality,
            "Measured frame"
        );

        Ok(MeasurementReport {
            user_id: user_id.to_string(),
            measurement,
            method: detection.method,
            detection_confidence: detection.confidence,
            detection_exhausted: detection.exhausted,
            valid: is_valid,
            corrections_applied: corrections.len(),
            profile_version: outcome.profile_version,
        })
    }

    /// Stop background monitoring.
    pub fn shutdown(&self) {
        self.monitor.stop();
    }
}

fn combined_quality(detection: Quality, validation: Quality) -> Quality {
    detection.min(validation)
}

/// Assembles a [`MeasurementSystem`] from a [`ConfigFile`].
///
/// Without explicit strategies the chain is any landmark backends given to
/// [`with_landmark_backend`](Self::with_landmark_backend), followed by the
/// contour, edge and skin-tone heuristics.
pub struct MeasurementSystemBuilder {
    config: ConfigFile,
    probe: Option<Arc<dyn DeviceProbe>>,
    telemetry: Option<Arc<dyn TelemetrySource>>,
    store: Option<Arc<ProfileStore>>,
    backends: Vec<(String, Arc<dyn LandmarkBackend>)>,
    strategies: Option<Vec<Arc<dyn DetectionStrategy>>>,
}

impl MeasurementSystemBuilder {
    pub fn new(config: ConfigFile) -> Self {
        Self {
            config,
            probe: None,
            telemetry: None,
            store: None,
            backends: Vec::new(),
            strategies: None,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn DeviceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySource>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_profile_store(mut self, store: Arc<ProfileStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Add a pose-tracking backend ahead of the image heuristics.
    pub fn with_landmark_backend(
        mut self,
        name: impl Into<String>,
        backend: Arc<dyn LandmarkBackend>,
    ) -> Self {
        self.backends.push((name.into(), backend));
        self
    }

    /// Replace the whole chained strategy list.
    pub fn with_strategies(mut self, strategies: Vec<Arc<dyn DetectionStrategy>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    pub fn build(self) -> MeasurementSystem {
        let config = self.config;

        let probe = self.probe.unwrap_or_else(|| Arc::new(SystemProbe::new()));
        let capabilities = Arc::new(CapabilityProfiler::new(config.capability.clone(), probe));
        let tuning = Arc::new(TuningState::from_capabilities(&capabilities.detect()));
        let resilience = Arc::new(ResilienceLayer::new(config.resilience.clone()));

        let strategies = self.strategies.unwrap_or_else(|| {
            let mut chain: Vec<Arc<dyn DetectionStrategy>> = self
                .backends
                .into_iter()
                .map(|(name, backend)| {
                    Arc::new(ArTrackingStrategy::new(name, backend)) as Arc<dyn DetectionStrategy>
                })
                .collect();
            chain.push(Arc::new(ContourStrategy::new(Default::default())));
            chain.push(Arc::new(EdgeStrategy::new(Default::default())));
            chain.push(Arc::new(SkinToneStrategy));
            chain
        });
        let pipeline = Arc::new(
            strategies
                .into_iter()
                .fold(
                    DetectionPipeline::builder(config.detection.clone()),
                    |builder, strategy| builder.with_strategy(strategy),
                )
                .with_resilience(Arc::clone(&resilience))
                .with_tuning(Arc::clone(&tuning))
                .build(),
        );

        let validator = Arc::new(AccuracyValidator::new(config.validation.clone()));
        let store = self.store.unwrap_or_default();
        let calibration = Arc::new(CalibrationEngine::new(config.calibration.clone(), store));

        let telemetry = self
            .telemetry
            .unwrap_or_else(|| Arc::new(SyntheticTelemetry::default()));
        let monitor = Arc::new(PerformanceMonitor::new(config.monitor.clone(), telemetry));
        let optimizer = Arc::new(PerformanceOptimizer::new(
            config.optimizer.clone(),
            Arc::clone(&capabilities),
            Arc::clone(&tuning),
            Predictor::linear(DEFAULT_HORIZON, config.monitor.tick_interval),
        ));

        let modules: Vec<Arc<dyn CoreModule>> = vec![
            Arc::new(DetectionModule::new(Arc::clone(&pipeline))),
            Arc::new(ValidationModule::new(Arc::clone(&validator))),
            Arc::new(CalibrationModule::new(Arc::clone(&calibration))),
            Arc::new(PerformanceModule::new(
                Arc::clone(&monitor),
                Arc::clone(&optimizer),
            )),
        ];
        let probe = Arc::new(DetectionAccuracyProbe::new(
            Arc::clone(&pipeline),
            Some(Arc::clone(&resilience)),
        ));
        let startup = StartupCoordinator::new(
            config.startup.clone(),
            Arc::clone(&capabilities),
            modules,
            probe,
        );

        tracing::debug!(
            strategies = %pipeline.strategy_names().join(" → "),
            "Measurement system assembled"
        );

        MeasurementSystem {
            config,
            capabilities,
            resilience,
            tuning,
            pipeline,
            extractor: MeasurementExtractor::default(),
            validator,
            calibration,
            monitor,
            optimizer,
            startup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::StaticProbe;
    use crate::detection::SyntheticBodyBackend;
    use crate::startup::StartupStatus;

    fn create_test_system(height_cm: f64, shoulder_cm: f64) -> MeasurementSystem {
        let mut config = ConfigFile::default();
        config.startup.optimize_performance = false;
        MeasurementSystem::builder(config)
            .with_probe(Arc::new(StaticProbe::new(8.0, 8)))
            .with_landmark_backend(
                "ar_primary",
                Arc::new(SyntheticBodyBackend::new(height_cm, shoulder_cm)),
            )
            .build()
    }

    #[tokio::test]
    async fn test_measure_plausible_body() {
        let system = create_test_system(172.0, 45.0);
        let report = system.measure("u1", &Frame::blank(64, 64)).await.unwrap();

        assert_eq!(report.method, "ar_primary");
        assert!(report.valid);
        assert!(!report.detection_exhausted);
        assert!(!report.measurement.calibration_applied);
        assert!((report.measurement.height_cm - 172.0).abs() < 1.0);
        assert!((report.measurement.shoulder_width_cm - 45.0).abs() < 1.0);
        assert!((report.measurement.chest_cm - report.measurement.height_cm * 0.56).abs() < 1e-9);
        assert_eq!(system.capabilities().frame_timings().len(), 1);
    }

    #[tokio::test]
    async fn test_measure_corrects_implausible_shoulders() {
        let system = create_test_system(175.0, 25.0);
        let report = system.measure("u1", &Frame::blank(64, 64)).await.unwrap();

        assert!(!report.valid);
        assert!(report.corrections_applied > 0);
        assert!(report.measurement.shoulder_width_cm >= 35.0 - 1e-9);
        assert!(!report.measurement.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_default_chain_ends_with_heuristics() {
        let system = create_test_system(175.0, 44.0);
        assert_eq!(
            system.pipeline().strategy_names(),
            vec![
                "ar_primary",
                "computer_vision",
                "edge_detection",
                "color_analysis",
                "fallback"
            ]
        );
    }

    #[tokio::test]
    async fn test_startup_is_ready() {
        let system = create_test_system(175.0, 44.0);
        let report = system.startup().initialize().await;
        assert_eq!(report.status(), StartupStatus::Ready);
        assert!(!system.monitor().is_active());
    }

    #[test]
    fn test_combined_quality_is_the_worse_grade() {
        assert_eq!(combined_quality(Quality::Excellent, Quality::Fair), Quality::Fair);
        assert_eq!(combined_quality(Quality::Poor, Quality::Good), Quality::Poor);
    }
}
