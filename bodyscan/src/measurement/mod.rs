//! Measurement records and landmark extraction.
//!
//! A [`RawMeasurement`] is derived from one frame's landmarks by the
//! [`MeasurementExtractor`]. After validation and user calibration it is
//! expanded into a [`CalibratedMeasurement`], the record handed to the
//! order flow.

mod extract;
mod types;

pub use extract::{ExtractionConfig, MeasurementExtractor, ProportionalEstimate};
pub use types::{CalibratedMeasurement, Quality, RawMeasurement};
