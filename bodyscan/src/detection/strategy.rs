//! Detection strategies.
//!
//! Every method the pipeline can try implements [`DetectionStrategy`].
//! Strategies are deterministic for a given frame and backend, so each one
//! can be tested on its own.
//!
//! | Strategy                   | Source                  | Confidence                      |
//! |----------------------------|-------------------------|---------------------------------|
//! | [`ArTrackingStrategy`]     | native tracking backend | mean landmark confidence        |
//! | [`ContourStrategy`]        | gradient contours       | `min(0.2 + 0.15·shapes, 0.75)`  |
//! | [`EdgeStrategy`]           | Sobel contours          | `min(0.1·shapes, 0.8)`          |
//! | [`SkinToneStrategy`]       | skin-tone blobs         | `min(0.15·blobs, 0.7)`          |
//! | [`CenteredFallbackStrategy`] | none                  | fixed 0.1                       |

use std::sync::Arc;

use super::heuristics::{self, Region, ShapeFilter};
use super::landmarks::{BodyLandmarks, BoundingBox};
use super::types::{DetectionError, DetectionResult, Frame};
use crate::measurement::Quality;
use crate::BoxFuture;

/// Confidence above which image heuristics report `detected`.
const HEURISTIC_DETECTED_THRESHOLD: f64 = 0.3;

/// Confidence above which native tracking reports `detected`.
const TRACKING_DETECTED_THRESHOLD: f64 = 0.5;

/// Minimum blob size for the skin-tone heuristic.
const MIN_SKIN_BLOB_PIXELS: usize = 50;

/// One interchangeable body-detection method.
pub trait DetectionStrategy: Send + Sync {
    /// Stable name, used as the result's method and the breaker key.
    fn name(&self) -> &str;

    /// Whether the strategy is costly enough to skip at low processing quality.
    fn is_expensive(&self) -> bool {
        false
    }

    fn detect<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<DetectionResult, DetectionError>>;
}

/// Native pose-tracking backend (AR session, pose model, ...).
pub trait LandmarkBackend: Send + Sync {
    fn name(&self) -> &str;

    fn track<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<BodyLandmarks, DetectionError>>;
}

/// Strategy wrapping a native tracking backend.
pub struct ArTrackingStrategy {
    name: String,
    backend: Arc<dyn LandmarkBackend>,
}

impl ArTrackingStrategy {
    pub fn new(name: impl Into<String>, backend: Arc<dyn LandmarkBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    fn grade(confidence: f64) -> Quality {
        if confidence > 0.8 {
            Quality::Excellent
        } else if confidence > 0.6 {
            Quality::Good
        } else {
            Quality::Fair
        }
    }
}

impl DetectionStrategy for ArTrackingStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<DetectionResult, DetectionError>> {
        Box::pin(async move {
            let landmarks = self.backend.track(frame).await?;
            let confidence = landmarks.mean_confidence();
            Ok(
                DetectionResult::detected(self.name.clone(), landmarks, Self::grade(confidence))
                    .with_detected(confidence > TRACKING_DETECTED_THRESHOLD),
            )
        })
    }
}

/// Build a heuristic result from the regions found in a frame.
fn heuristic_result(
    method: &str,
    frame: &Frame,
    target: Option<&Region>,
    confidence: f64,
) -> DetectionResult {
    let bbox = target
        .map(Region::bounding_box)
        .unwrap_or_else(|| BoundingBox::centered(frame.width(), frame.height()));
    let landmarks = BodyLandmarks::from_template(
        &bbox,
        frame.metres_per_pixel,
        confidence,
        confidence * 0.8,
    );
    let quality = if confidence > 0.6 {
        Quality::Good
    } else if confidence > HEURISTIC_DETECTED_THRESHOLD {
        Quality::Fair
    } else {
        Quality::Poor
    };

    let mut result = DetectionResult::detected(method, landmarks, quality)
        .with_confidence(confidence)
        .with_detected(confidence > HEURISTIC_DETECTED_THRESHOLD);
    if target.is_none() {
        result.landmarks = None;
    }
    result
}

/// Contour analysis over a forward-difference gradient map.
#[derive(Debug, Default)]
pub struct ContourStrategy {
    filter: ShapeFilter,
}

impl ContourStrategy {
    pub fn new(filter: ShapeFilter) -> Self {
        Self { filter }
    }

    fn analyse(&self, frame: &Frame) -> Result<DetectionResult, DetectionError> {
        let gray = heuristics::grayscale(&frame.image)?;
        let contours = heuristics::find_contours(&heuristics::gradient_edges(&gray));
        let shapes: Vec<Region> = contours
            .into_iter()
            .filter(|c| c.is_human_shape(&self.filter))
            .collect();

        let confidence = if shapes.is_empty() {
            0.0
        } else {
            (0.2 + 0.15 * shapes.len() as f64).min(0.75)
        };
        tracing::debug!(shapes = shapes.len(), confidence, "Contour analysis");
        Ok(heuristic_result(
            self.name(),
            frame,
            heuristics::largest(&shapes),
            confidence,
        ))
    }
}

impl DetectionStrategy for ContourStrategy {
    fn name(&self) -> &str {
        "computer_vision"
    }

    fn is_expensive(&self) -> bool {
        true
    }

    fn detect<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<DetectionResult, DetectionError>> {
        Box::pin(async move { self.analyse(frame) })
    }
}

/// Sobel edge heuristic.
#[derive(Debug, Default)]
pub struct EdgeStrategy {
    filter: ShapeFilter,
}

impl EdgeStrategy {
    pub fn new(filter: ShapeFilter) -> Self {
        Self { filter }
    }

    fn analyse(&self, frame: &Frame) -> Result<DetectionResult, DetectionError> {
        let gray = heuristics::grayscale(&frame.image)?;
        let shapes: Vec<Region> = heuristics::find_contours(&heuristics::sobel_edges(&gray))
            .into_iter()
            .filter(|c| c.is_human_shape(&self.filter))
            .collect();

        let confidence = (shapes.len() as f64 * 0.1).min(0.8);
        tracing::debug!(shapes = shapes.len(), confidence, "Edge analysis");
        Ok(heuristic_result(
            self.name(),
            frame,
            heuristics::largest(&shapes),
            confidence,
        ))
    }
}

impl DetectionStrategy for EdgeStrategy {
    fn name(&self) -> &str {
        "edge_detection"
    }

    fn is_expensive(&self) -> bool {
        true
    }

    fn detect<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<DetectionResult, DetectionError>> {
        Box::pin(async move { self.analyse(frame) })
    }
}

/// Skin-tone blob heuristic.
#[derive(Debug, Default)]
pub struct SkinToneStrategy;

impl DetectionStrategy for SkinToneStrategy {
    fn name(&self) -> &str {
        "color_analysis"
    }

    fn detect<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<DetectionResult, DetectionError>> {
        Box::pin(async move {
            let blobs = heuristics::skin_regions(&frame.image, MIN_SKIN_BLOB_PIXELS);
            let confidence = (blobs.len() as f64 * 0.15).min(0.7);
            tracing::debug!(blobs = blobs.len(), confidence, "Skin-tone analysis");
            Ok(heuristic_result(
                self.name(),
                frame,
                heuristics::largest(&blobs),
                confidence,
            ))
        })
    }
}

/// Last-resort strategy: a centred template at fixed low confidence.
///
/// Always reports `detected = true`; callers must look at the confidence
/// and the pipeline's `exhausted` flag.
#[derive(Debug)]
pub struct CenteredFallbackStrategy {
    confidence: f64,
}

impl Default for CenteredFallbackStrategy {
    fn default() -> Self {
        Self { confidence: 0.1 }
    }
}

impl DetectionStrategy for CenteredFallbackStrategy {
    fn name(&self) -> &str {
        "fallback"
    }

    fn detect<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<DetectionResult, DetectionError>> {
        Box::pin(async move {
            let bbox = BoundingBox::centered(frame.width(), frame.height());
            let landmarks = BodyLandmarks::from_template(
                &bbox,
                frame.metres_per_pixel,
                self.confidence,
                self.confidence,
            );
            Ok(DetectionResult::detected(self.name(), landmarks, Quality::Poor)
                .with_confidence(self.confidence))
        })
    }
}
