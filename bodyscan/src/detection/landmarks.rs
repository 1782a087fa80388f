//! Body landmark model.
//!
//! Thirteen named 3D keypoints, each with its own confidence. Coordinates
//! are in metres in camera space: native tracking backends report them
//! directly, image heuristics convert from pixels using the frame scale.

use serde::{Deserialize, Serialize};

/// Named body keypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum LandmarkKind {
    Nose = 0,
    LeftShoulder = 1,
    RightShoulder = 2,
    LeftElbow = 3,
    RightElbow = 4,
    LeftWrist = 5,
    RightWrist = 6,
    LeftHip = 7,
    RightHip = 8,
    LeftKnee = 9,
    RightKnee = 10,
    LeftAnkle = 11,
    RightAnkle = 12,
}

impl LandmarkKind {
    pub const COUNT: usize = 13;

    pub const ALL: [LandmarkKind; Self::COUNT] = [
        LandmarkKind::Nose,
        LandmarkKind::LeftShoulder,
        LandmarkKind::RightShoulder,
        LandmarkKind::LeftElbow,
        LandmarkKind::RightElbow,
        LandmarkKind::LeftWrist,
        LandmarkKind::RightWrist,
        LandmarkKind::LeftHip,
        LandmarkKind::RightHip,
        LandmarkKind::LeftKnee,
        LandmarkKind::RightKnee,
        LandmarkKind::LeftAnkle,
        LandmarkKind::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Torso keypoints (nose, shoulders, hips) that every template places
    /// with higher confidence than the limbs.
    pub fn is_core(&self) -> bool {
        matches!(
            self,
            LandmarkKind::Nose
                | LandmarkKind::LeftShoulder
                | LandmarkKind::RightShoulder
                | LandmarkKind::LeftHip
                | LandmarkKind::RightHip
        )
    }

    /// Position inside a unit body box (x across, y down).
    fn template_position(&self) -> (f64, f64) {
        match self {
            LandmarkKind::Nose => (0.50, 0.06),
            LandmarkKind::LeftShoulder => (0.37, 0.19),
            LandmarkKind::RightShoulder => (0.63, 0.19),
            LandmarkKind::LeftElbow => (0.30, 0.34),
            LandmarkKind::RightElbow => (0.70, 0.34),
            LandmarkKind::LeftWrist => (0.27, 0.47),
            LandmarkKind::RightWrist => (0.73, 0.47),
            LandmarkKind::LeftHip => (0.42, 0.52),
            LandmarkKind::RightHip => (0.58, 0.52),
            LandmarkKind::LeftKnee => (0.42, 0.73),
            LandmarkKind::RightKnee => (0.58, 0.73),
            LandmarkKind::LeftAnkle => (0.42, 0.95),
            LandmarkKind::RightAnkle => (0.58, 0.95),
        }
    }
}

/// A single 3D keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub confidence: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64, confidence: f64) -> Self {
        Self { x, y, z, confidence }
    }

    pub fn is_visible(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }

    pub fn distance_to(&self, other: &Landmark) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn midpoint(&self, other: &Landmark) -> Landmark {
        Landmark {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
            z: (self.z + other.z) / 2.0,
            confidence: self.confidence.min(other.confidence),
        }
    }
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box centred in a frame, covering the typical framing of a standing
    /// subject (40% of the width, 80% of the height).
    pub fn centered(frame_width: u32, frame_height: u32) -> Self {
        let w = frame_width as f64 * 0.4;
        let h = frame_height as f64 * 0.8;
        Self::new(
            (frame_width as f64 - w) / 2.0,
            (frame_height as f64 - h) / 2.0,
            w,
            h,
        )
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Full landmark set for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyLandmarks {
    points: [Landmark; LandmarkKind::COUNT],
}

impl BodyLandmarks {
    pub fn new(points: [Landmark; LandmarkKind::COUNT]) -> Self {
        Self { points }
    }

    /// Place the body template inside `bbox`.
    ///
    /// `metres_per_pixel` converts the pixel box into camera-space metres.
    /// Core keypoints get `core_confidence`, limbs get `limb_confidence`.
    pub fn from_template(
        bbox: &BoundingBox,
        metres_per_pixel: f64,
        core_confidence: f64,
        limb_confidence: f64,
    ) -> Self {
        let mut points = [Landmark::default(); LandmarkKind::COUNT];
        for kind in LandmarkKind::ALL {
            let (u, v) = kind.template_position();
            let confidence = if kind.is_core() {
                core_confidence
            } else {
                limb_confidence
            };
            points[kind as usize] = Landmark::new(
                (bbox.x + u * bbox.width) * metres_per_pixel,
                (bbox.y + v * bbox.height) * metres_per_pixel,
                0.0,
                confidence,
            );
        }
        Self { points }
    }

    pub fn get(&self, kind: LandmarkKind) -> &Landmark {
        &self.points[kind as usize]
    }

    pub fn set(&mut self, kind: LandmarkKind, landmark: Landmark) {
        self.points[kind as usize] = landmark;
    }

    pub fn iter(&self) -> impl Iterator<Item = (LandmarkKind, &Landmark)> {
        LandmarkKind::ALL.iter().copied().zip(self.points.iter())
    }

    /// Mean of the per-point confidences.
    pub fn mean_confidence(&self) -> f64 {
        self.points.iter().map(|p| p.confidence).sum::<f64>() / LandmarkKind::COUNT as f64
    }

    /// Fraction of points at or above the visibility threshold.
    pub fn visibility_ratio(&self, threshold: f64) -> f64 {
        let visible = self.points.iter().filter(|p| p.is_visible(threshold)).count();
        visible as f64 / LandmarkKind::COUNT as f64
    }
}
