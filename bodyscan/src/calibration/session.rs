//! Stepwise calibration session state machine.
//!
//! ```text
//!   Active ──(final step complete)──► Completed
//!     │
//!     ├──(cancel)────────────────────► Cancelled
//!     └──(step attempts exhausted,───► Failed
//!         or too few samples at the end)
//! ```
//!
//! `current_step` only advances once the active step holds at least
//! `min_samples` valid samples. Terminal states are final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{CalibrationSample, SessionStatus, StepSpec};
use crate::measurement::Quality;

/// A submitted sample and whether it counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    pub sample: CalibrationSample,
    pub valid: bool,
    /// Feedback for rejected samples.
    pub rejection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStep {
    pub spec: StepSpec,
    pub samples: Vec<RecordedSample>,
    pub completed: bool,
    pub feedback: String,
}

impl CalibrationStep {
    fn new(spec: StepSpec) -> Self {
        Self {
            spec,
            samples: Vec::new(),
            completed: false,
            feedback: String::new(),
        }
    }

    pub fn valid_samples(&self) -> usize {
        self.samples.iter().filter(|s| s.valid).count()
    }

    pub fn attempts(&self) -> usize {
        self.samples.len()
    }

    pub fn is_satisfied(&self) -> bool {
        self.valid_samples() >= self.spec.min_samples
    }
}

/// What a single submission did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepProgress {
    Rejected,
    Accepted,
    StepCompleted,
    /// The final step completed; the session is ready to finalize.
    AllStepsCompleted,
    /// The step used up its attempts without completing.
    AttemptsExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSession {
    pub id: String,
    pub user_id: String,
    pub status: SessionStatus,
    pub steps: Vec<CalibrationStep>,
    pub current_step: usize,
    pub quality: Quality,
    /// Valid samples over all submitted samples.
    pub accuracy: f64,
    /// Mean confidence of valid samples.
    pub confidence: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub failure: Option<String>,
}

impl CalibrationSession {
    pub(crate) fn new(id: String, user_id: String, specs: Vec<StepSpec>) -> Self {
        Self {
            id,
            user_id,
            status: SessionStatus::Active,
            steps: specs.into_iter().map(CalibrationStep::new).collect(),
            current_step: 0,
            quality: Quality::Poor,
            accuracy: 0.0,
            confidence: 0.0,
            started_at: Utc::now(),
            ended_at: None,
            failure: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// The step accepting samples, if any is left.
    pub fn active_step(&self) -> Option<&CalibrationStep> {
        self.steps.get(self.current_step).filter(|s| !s.completed)
    }

    pub fn all_steps_completed(&self) -> bool {
        self.steps.iter().all(|s| s.completed)
    }

    /// Valid samples across every step, in submission order.
    pub fn valid_samples(&self) -> impl Iterator<Item = &CalibrationSample> {
        self.steps
            .iter()
            .flat_map(|step| step.samples.iter())
            .filter(|s| s.valid)
            .map(|s| &s.sample)
    }

    pub fn total_samples(&self) -> usize {
        self.steps.iter().map(CalibrationStep::attempts).sum()
    }

    /// Record a sample against the active step. The caller checks that the
    /// session is active and has a step.
    pub(crate) fn submit(&mut self, sample: CalibrationSample) -> (StepProgress, String) {
        let index = self.current_step;
        let step_count = self.steps.len();
        let Some(step) = self.steps.get_mut(index) else {
            return (StepProgress::Rejected, String::new());
        };

        let verdict = step.spec.check(&sample);
        let valid = verdict.is_ok();
        let rejection = verdict.err();
        step.samples.push(RecordedSample {
            sample,
            valid,
            rejection: rejection.clone(),
        });

        let result = if step.is_satisfied() {
            step.completed = true;
            step.feedback = format!(
                "Step completed successfully with {}/{} valid samples",
                step.valid_samples(),
                step.attempts()
            );
            let feedback = step.feedback.clone();
            if index + 1 < step_count {
                self.current_step += 1;
                (StepProgress::StepCompleted, feedback)
            } else {
                (StepProgress::AllStepsCompleted, feedback)
            }
        } else if step.attempts() >= step.spec.attempt_limit() {
            let feedback = format!(
                "Step needs more samples. Current: {}/{} required",
                step.valid_samples(),
                step.spec.min_samples
            );
            (StepProgress::AttemptsExhausted, feedback)
        } else if let Some(rejection) = rejection {
            (StepProgress::Rejected, rejection)
        } else {
            (StepProgress::Accepted, "Sample accepted".to_string())
        };

        self.refresh_metrics();
        result
    }

    pub(crate) fn finish(&mut self, status: SessionStatus, failure: Option<String>) {
        self.status = status;
        self.failure = failure;
        self.ended_at = Some(Utc::now());
    }

    fn refresh_metrics(&mut self) {
        let completed = self.steps.iter().filter(|s| s.completed).count();
        let completion = if self.steps.is_empty() {
            0.0
        } else {
            completed as f64 / self.steps.len() as f64
        };
        self.quality = if completion >= 0.9 {
            Quality::Excellent
        } else if completion >= 0.7 {
            Quality::Good
        } else if completion >= 0.5 {
            Quality::Fair
        } else {
            Quality::Poor
        };

        let total = self.total_samples();
        let confidences: Vec<f64> = self.valid_samples().map(|s| s.measurement.confidence).collect();
        self.accuracy = if total == 0 {
            0.0
        } else {
            confidences.len() as f64 / total as f64
        };
        self.confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
    }
}
