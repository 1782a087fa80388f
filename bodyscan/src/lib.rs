//! Bodyscan - adaptive body measurement
//!
//! Turns camera frames into calibrated body measurements. Detection falls
//! back through an ordered strategy chain, measurements are checked against
//! anatomical ranges and per-user calibration, and a performance control
//! loop tunes frame rate and quality to the device.
//!
//! Most callers start from [`system::MeasurementSystem`].

use std::future::Future;
use std::pin::Pin;

pub mod calibration;
pub mod capability;
pub mod config;
pub mod detection;
pub mod history;
pub mod logging;
pub mod measurement;
pub mod performance;
pub mod resilience;
pub mod startup;
pub mod system;
pub mod validation;

/// Boxed, sendable future used by the object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
