//! Body detection.
//!
//! A [`DetectionPipeline`] runs an ordered chain of [`DetectionStrategy`]
//! implementations and accepts the first confident result. Native tracking
//! backends plug in through [`LandmarkBackend`]; the image heuristics in
//! [`heuristics`] need nothing but the frame pixels.
//!
//! The default chain, in order:
//!
//! 1. primary native tracking (`ArTrackingStrategy`)
//! 2. secondary native tracking (`ArTrackingStrategy`)
//! 3. contour analysis (`ContourStrategy`)
//! 4. Sobel edges (`EdgeStrategy`)
//! 5. skin tone (`SkinToneStrategy`)
//! 6. last resort: centred template (`CenteredFallbackStrategy`)
//!
//! [`ContinuousTracker`] drives the pipeline from a [`FrameSource`] in the
//! background.

pub mod heuristics;
mod landmarks;
mod pipeline;
mod strategy;
mod synthetic;
mod tracker;
mod types;

pub use landmarks::{BodyLandmarks, BoundingBox, Landmark, LandmarkKind};
pub use pipeline::{DetectionConfig, DetectionPipeline, DetectionPipelineBuilder, DetectionStats};
pub use strategy::{
    ArTrackingStrategy, CenteredFallbackStrategy, ContourStrategy, DetectionStrategy,
    EdgeStrategy, LandmarkBackend, SkinToneStrategy,
};
pub use synthetic::{SyntheticBodyBackend, SyntheticFrameSource};
pub use tracker::{ContinuousTracker, FrameSource};
pub use types::{DetectionError, DetectionResult, Frame};
