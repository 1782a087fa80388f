//! Per-user calibration.
//!
//! A [`CalibrationSession`] walks the user through ordered steps, each with
//! its own capture requirements and sample counts. Completing the last step
//! folds the valid samples into the user's [`CalibrationProfile`], creating
//! version 1 or bumping the stored version.
//!
//! | Step                   | Pose / distance / lighting | Samples | Threshold |
//! |------------------------|----------------------------|---------|-----------|
//! | initial_setup          | standing / medium / normal | 3–5     | 0.6       |
//! | front_pose             | standing / medium / normal | 3–5     | 0.7       |
//! | side_pose              | standing / medium / normal | 3–5     | 0.7       |
//! | reference_measurements | any                        | 1       | 0.5       |
//! | validation             | standing / medium / normal | 2–4     | 0.8       |
//! | finalization           | any                        | 1       | 0.9       |
//!
//! Profiles live in a [`ProfileStore`] that only accepts increasing
//! versions. It is in-memory; `export_json`/`import_json` let a caller
//! persist it.

mod engine;
mod error;
mod profile;
mod session;
mod types;

pub use engine::{CalibrationConfig, CalibrationEngine, CalibrationOutcome};
pub use error::CalibrationError;
pub use profile::{
    AccuracyEntry, BodyType, CalibrationProfile, FieldFactors, LearningParams, PhysicalProfile,
    ProfileStore, QualityMetrics, ReferenceMeasurement,
};
pub use session::{CalibrationSession, CalibrationStep, RecordedSample};
pub use types::{
    default_steps, CalibrationSample, CalibrationStatistics, DistanceFit, KnownMeasurements,
    PoseFit, RequiredDistance, RequiredLighting, RequiredPose, SampleContext, SampleOutcome,
    SampleQualityReport, SessionStatus, StepSpec,
};
