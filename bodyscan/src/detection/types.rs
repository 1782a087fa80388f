//! Frames, detection results and errors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::{Rgba, RgbaImage};
use thiserror::Error;

use super::landmarks::BodyLandmarks;
use crate::measurement::Quality;

/// Vertical span, in metres, assumed visible in a frame without depth data.
const DEFAULT_FRAME_SPAN_M: f64 = 2.2;

/// A camera frame handed to the detection pipeline.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbaImage>,
    /// Pixel-to-metre scale for image heuristics.
    pub metres_per_pixel: f64,
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbaImage) -> Self {
        let height = image.height().max(1) as f64;
        Self {
            image: Arc::new(image),
            metres_per_pixel: DEFAULT_FRAME_SPAN_M / height,
            sequence: 0,
            captured_at: Utc::now(),
        }
    }

    /// Uniform black frame.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])))
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_metres_per_pixel(mut self, metres_per_pixel: f64) -> Self {
        self.metres_per_pixel = metres_per_pixel;
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Outcome of one detection attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub detected: bool,
    pub confidence: f64,
    pub landmarks: Option<BodyLandmarks>,
    /// Name of the strategy that produced this result.
    pub method: String,
    pub quality: Quality,
    /// Set when no strategy cleared the confidence threshold and the
    /// last-resort strategy supplied this result.
    pub exhausted: bool,
}

impl DetectionResult {
    pub fn detected(method: impl Into<String>, landmarks: BodyLandmarks, quality: Quality) -> Self {
        Self {
            detected: true,
            confidence: landmarks.mean_confidence(),
            landmarks: Some(landmarks),
            method: method.into(),
            quality,
            exhausted: false,
        }
    }

    pub fn not_detected(method: impl Into<String>) -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            landmarks: None,
            method: method.into(),
            quality: Quality::Poor,
            exhausted: false,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_detected(mut self, detected: bool) -> Self {
        self.detected = detected;
        self
    }
}

/// Errors raised by detection strategies and frame sources.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// The native tracking backend is not available on this device.
    #[error("tracking backend '{0}' unavailable")]
    BackendUnavailable(String),

    /// The backend was available but failed while processing the frame.
    #[error("tracking backend '{backend}' failed: {message}")]
    BackendFailed { backend: String, message: String },

    /// The frame could not be analysed.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The frame source has no more frames.
    #[error("frame source exhausted")]
    SourceExhausted,
}
