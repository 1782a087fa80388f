//! The assembled measurement system.
//!
//! [`MeasurementSystem`] is built once by the process entry point and
//! passed by reference. It owns the subsystems that would otherwise be
//! process-wide singletons.

mod context;
mod error;

pub use context::{MeasurementReport, MeasurementSystem, MeasurementSystemBuilder};
pub use error::MeasurementError;
