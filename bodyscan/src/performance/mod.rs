//! Real-time performance monitoring and adaptive tuning.
//!
//! ```text
//!  TelemetrySource ──► PerformanceMonitor ──tick──► PerformanceOptimizer ──► TuningState
//!                         │  history (100)              │ Predictor                │
//!                         │  alerts (50)                │ CapabilityProfiler       ├─► DetectionPipeline
//!                         └─ status / trends            └─ decisions (50)          └─► ContinuousTracker
//! ```
//!
//! The monitor samples on a fixed tick and raises tiered alerts. The
//! optimizer runs as a [`TickObserver`] inside the same tick and writes
//! its decision to the shared [`TuningState`].

mod alerts;
mod monitor;
mod optimizer;
mod predict;
mod telemetry;
mod tuning;
mod types;

pub use alerts::{AlertThresholds, Tiers};
pub use monitor::{MonitorConfig, PerformanceMonitor, TickObserver};
pub use optimizer::{OptimizationDecision, OptimizerConfig, PerformanceOptimizer};
pub use predict::{
    LinearModel, PerformancePrediction, Prediction, PredictiveModel, Predictor, DEFAULT_HORIZON,
};
pub use telemetry::{
    ScriptedTelemetry, SyntheticProfile, SyntheticTelemetry, TelemetryError, TelemetrySource,
};
pub use tuning::{
    ProcessingMode, ProcessingQuality, TuningState, MIN_FRAME_RATE, MIN_MEMORY_LIMIT_MB,
};
pub use types::{
    AlertKind, HealthGrade, PerformanceAlert, PerformanceSnapshot, PerformanceStatus,
    PerformanceTrends, Recommendation, RecommendationCategory, Severity, ThermalState, TickReport,
    TrendDirection,
};
