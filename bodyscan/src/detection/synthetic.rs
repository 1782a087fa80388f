//! Deterministic stand-ins for a camera and a pose backend.
//!
//! Used by the CLI `simulate` command and by integration tests. The body
//! they describe has a fixed height and shoulder width; a small
//! sequence-dependent wobble keeps successive frames from being identical.

use std::sync::atomic::{AtomicU64, Ordering};

use image::{Rgba, RgbaImage};

use super::landmarks::{BodyLandmarks, BoundingBox};
use super::strategy::LandmarkBackend;
use super::tracker::FrameSource;
use super::types::{DetectionError, Frame};
use crate::measurement::ExtractionConfig;
use crate::BoxFuture;

/// Nose to ankle span of the landmark template, as a share of the body box.
const TEMPLATE_VERTICAL_SPAN: f64 = 0.89;
/// Shoulder to shoulder span of the landmark template.
const TEMPLATE_SHOULDER_SPAN: f64 = 0.26;

/// Pose backend that reports a body of known dimensions.
#[derive(Debug, Clone)]
pub struct SyntheticBodyBackend {
    height_cm: f64,
    shoulder_width_cm: f64,
    confidence: f64,
    jitter_cm: f64,
}

impl SyntheticBodyBackend {
    pub fn new(height_cm: f64, shoulder_width_cm: f64) -> Self {
        Self {
            height_cm,
            shoulder_width_cm,
            confidence: 0.9,
            jitter_cm: 0.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Peak deviation applied across successive frame sequences.
    pub fn with_jitter_cm(mut self, jitter_cm: f64) -> Self {
        self.jitter_cm = jitter_cm.abs();
        self
    }

    /// Landmarks for the given frame sequence, in metres.
    pub fn landmarks_for(&self, sequence: u64) -> BodyLandmarks {
        let wobble = (sequence as f64 * 0.7).sin() * self.jitter_cm;
        let extraction = ExtractionConfig::default();
        let height_m = (self.height_cm + wobble) / extraction.cm_per_unit;
        let shoulder_m = (self.shoulder_width_cm + wobble * 0.25) / extraction.cm_per_unit;

        let body = BoundingBox::new(
            0.0,
            0.0,
            shoulder_m / TEMPLATE_SHOULDER_SPAN,
            height_m / (TEMPLATE_VERTICAL_SPAN * extraction.crown_factor),
        );
        BodyLandmarks::from_template(&body, 1.0, self.confidence, self.confidence)
    }
}

impl LandmarkBackend for SyntheticBodyBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn track<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<BodyLandmarks, DetectionError>> {
        let landmarks = self.landmarks_for(frame.sequence);
        Box::pin(async move { Ok(landmarks) })
    }
}

/// Frame source producing a lit figure on a dark background.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    limit: Option<u64>,
    next_sequence: AtomicU64,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(8),
            height: height.max(8),
            limit: None,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Stop with [`DetectionError::SourceExhausted`] after `limit` frames.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the frame with the given sequence number.
    pub fn render(&self, sequence: u64) -> Frame {
        let figure = BoundingBox::centered(self.width, self.height);
        let image = RgbaImage::from_fn(self.width, self.height, |x, y| {
            let (x, y) = (x as f64, y as f64);
            let inside = x >= figure.x
                && x < figure.x + figure.width
                && y >= figure.y
                && y < figure.y + figure.height;
            if inside {
                Rgba([205, 150, 120, 255])
            } else {
                Rgba([20, 24, 28, 255])
            }
        });
        Frame::new(image).with_sequence(sequence)
    }
}

impl FrameSource for SyntheticFrameSource {
    fn next_frame(&self) -> BoxFuture<'_, Result<Frame, DetectionError>> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let result = match self.limit {
            Some(limit) if sequence >= limit => Err(DetectionError::SourceExhausted),
            _ => Ok(self.render(sequence)),
        };
        Box::pin(async move { result })
    }
}
