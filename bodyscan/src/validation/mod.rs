//! Measurement validation.
//!
//! ```text
//!   RawMeasurement ─► confidence gate ─► range check ─► proportion check ─► quality
//!                          (warning)      (scale)        (proportional)        │
//!                                                                              ▼
//!                                       history (50) ◄── record ── smoothing (window 5)
//! ```
//!
//! | Check        | Rule                                  | Correction               |
//! |--------------|---------------------------------------|--------------------------|
//! | Confidence   | `confidence ≥ 0.6`                    | none, warning only       |
//! | Shoulders    | 35–50cm                               | scale `bound / value`    |
//! | Height       | 150–200cm                             | scale `bound / value`    |
//! | Proportions  | `height / shoulders` within 3.5 ± 0.5 | proportional, one field  |
//!
//! Corrections are returned as data. Callers apply them explicitly with
//! [`AccuracyValidator::apply_corrections`].

mod types;
mod validator;

pub use types::{
    AccuracyMetrics, CorrectionKind, HistoryEntry, MeasurementCorrection, MeasurementField,
    Outlier, OutlierSeverity, ValidationResult,
};
pub use validator::{AccuracyConfig, AccuracyValidator, PlausibleRange};
