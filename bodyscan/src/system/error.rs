//! Measurement errors.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeasurementError {
    /// No strategy, not even the last resort, found a body.
    #[error("no body detected in frame {sequence}")]
    NoBodyDetected { sequence: u64 },

    /// Landmarks were found but the ones measurements need were missing.
    #[error("required landmarks missing ({method})")]
    LandmarksIncomplete { method: String },
}
