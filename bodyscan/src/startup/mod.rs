//! Startup coordination.
//!
//! [`StartupCoordinator::initialize`] runs capability detection, the
//! [`CoreModule`]s and an accuracy check exactly once. Failures do not
//! surface as errors: callers branch on [`StartupReport::accuracy_preserved`]
//! or on [`StartupReport::status`].
//!
//! | Module        | Critical | Enabled by             |
//! |---------------|----------|------------------------|
//! | `detection`   | yes      | always                 |
//! | `validation`  | yes      | always                 |
//! | `calibration` | no       | `maintain_calibration` |
//! | `performance` | no       | `optimize_performance` |

mod coordinator;
mod error;
mod modules;

pub use coordinator::{
    StartupConfig, StartupCoordinator, StartupReport, StartupStatus, ADVANCED_FEATURES,
};
pub use error::StartupError;
pub use modules::{
    AccuracyProbe, CalibrationModule, CoreModule, DetectionAccuracyProbe, DetectionModule,
    PerformanceModule, ValidationModule,
};
