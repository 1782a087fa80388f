//! Calibration session vocabulary: steps, samples and their context.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::measurement::{Quality, RawMeasurement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredPose {
    Standing,
    Sitting,
    Lying,
    Any,
}

impl RequiredPose {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredPose::Standing => "standing",
            RequiredPose::Sitting => "sitting",
            RequiredPose::Lying => "lying",
            RequiredPose::Any => "any",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredDistance {
    Close,
    Medium,
    Far,
    Any,
}

impl RequiredDistance {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredDistance::Close => "close",
            RequiredDistance::Medium => "medium",
            RequiredDistance::Far => "far",
            RequiredDistance::Any => "any",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredLighting {
    Bright,
    Normal,
    Dim,
    Any,
}

/// How the subject's distance compares to the optimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceFit {
    Optimal,
    TooClose,
    TooFar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseFit {
    Optimal,
    Acceptable,
    Poor,
}

/// Capture conditions reported alongside a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleContext {
    pub lighting: Quality,
    pub distance: DistanceFit,
    pub pose: PoseFit,
    pub stability: Quality,
}

impl Default for SampleContext {
    fn default() -> Self {
        Self {
            lighting: Quality::Good,
            distance: DistanceFit::Optimal,
            pose: PoseFit::Optimal,
            stability: Quality::Good,
        }
    }
}

/// User-entered measurements, used by the reference step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KnownMeasurements {
    pub height_cm: Option<f64>,
    pub shoulder_width_cm: Option<f64>,
}

impl KnownMeasurements {
    pub fn is_empty(&self) -> bool {
        self.height_cm.is_none() && self.shoulder_width_cm.is_none()
    }
}

/// One attempt submitted to the current step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub measurement: RawMeasurement,
    pub context: SampleContext,
    /// Quality the caller assigned, typically from validation.
    pub quality: Quality,
    pub known: Option<KnownMeasurements>,
}

impl CalibrationSample {
    pub fn new(measurement: RawMeasurement, quality: Quality) -> Self {
        Self {
            measurement,
            context: SampleContext::default(),
            quality,
            known: None,
        }
    }

    pub fn with_context(mut self, context: SampleContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_known(mut self, known: KnownMeasurements) -> Self {
        self.known = Some(known);
        self
    }
}

/// Requirements of one calibration step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub description: String,
    pub pose: RequiredPose,
    pub distance: RequiredDistance,
    pub lighting: RequiredLighting,
    pub min_samples: usize,
    pub max_samples: usize,
    /// Minimum sample confidence.
    pub quality_threshold: f64,
    /// Whether user-entered known measurements count in this step.
    #[serde(default)]
    pub accepts_known: bool,
}

impl StepSpec {
    pub fn new(name: impl Into<String>, min_samples: usize, max_samples: usize, quality_threshold: f64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            pose: RequiredPose::Standing,
            distance: RequiredDistance::Medium,
            lighting: RequiredLighting::Normal,
            min_samples,
            max_samples: max_samples.max(min_samples),
            quality_threshold,
            accepts_known: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Take user-entered known measurements in this step.
    pub fn with_known_input(mut self) -> Self {
        self.accepts_known = true;
        self
    }

    /// Accept any pose, distance and lighting.
    pub fn unconstrained(mut self) -> Self {
        self.pose = RequiredPose::Any;
        self.distance = RequiredDistance::Any;
        self.lighting = RequiredLighting::Any;
        self
    }

    /// Attempts after which an incomplete step fails the session.
    pub fn attempt_limit(&self) -> usize {
        self.max_samples.max(1) * 2
    }

    /// Check a sample against this step, returning the rejection feedback.
    pub fn check(&self, sample: &CalibrationSample) -> Result<(), String> {
        if self.pose != RequiredPose::Any && sample.context.pose == PoseFit::Poor {
            return Err(format!("Please maintain a {} pose", self.pose.as_str()));
        }
        if self.distance != RequiredDistance::Any && sample.context.distance != DistanceFit::Optimal {
            return Err(format!(
                "Please adjust your distance to {}",
                self.distance.as_str()
            ));
        }
        if self.lighting != RequiredLighting::Any && sample.context.lighting == Quality::Poor {
            return Err("Please improve lighting conditions".to_string());
        }
        if sample.quality == Quality::Poor || sample.measurement.confidence < self.quality_threshold {
            return Err("Please improve pose stability and lighting".to_string());
        }
        Ok(())
    }
}

/// The six-step session every new calibration runs through.
pub fn default_steps() -> Vec<StepSpec> {
    vec![
        StepSpec::new("initial_setup", 3, 5, 0.6)
            .with_description("Position yourself for calibration"),
        StepSpec::new("front_pose", 3, 5, 0.7).with_description("Face the camera directly"),
        StepSpec::new("side_pose", 3, 5, 0.7).with_description("Turn to your side"),
        StepSpec::new("reference_measurements", 1, 1, 0.5)
            .with_description("Enter known measurements")
            .with_known_input()
            .unconstrained(),
        StepSpec::new("validation", 2, 4, 0.8).with_description("Validate calibration accuracy"),
        StepSpec::new("finalization", 1, 1, 0.9)
            .with_description("Complete calibration process")
            .unconstrained(),
    ]
}

/// Result of submitting one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleOutcome {
    /// Whether the sample counted toward the step.
    pub accepted: bool,
    pub feedback: String,
    pub step_complete: bool,
    /// Step the sample was submitted to.
    pub step_index: usize,
    pub session_status: SessionStatus,
}

/// Aggregate over every session that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationStatistics {
    pub total_sessions: usize,
    pub completed_sessions: usize,
    /// Mean accuracy of completed sessions.
    pub average_accuracy: f64,
    pub average_quality: Quality,
    pub user_count: usize,
}

/// Standalone score for a sample's capture conditions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleQualityReport {
    /// 0..100.
    pub score: u32,
    pub quality: Quality,
    pub feedback: String,
}
