//! Calibration engine: sessions in, versioned profiles out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use super::error::CalibrationError;
use super::profile::{
    AccuracyEntry, BodyType, CalibrationProfile, FieldFactors, LearningParams, PhysicalProfile,
    ProfileStore, QualityMetrics, ReferenceMeasurement,
};
use super::session::{CalibrationSession, StepProgress};
use super::types::{
    default_steps, CalibrationSample, CalibrationStatistics, DistanceFit, KnownMeasurements,
    PoseFit, SampleOutcome, SampleQualityReport, SessionStatus, StepSpec,
};
use crate::history::BoundedHistory;
use crate::measurement::{Quality, RawMeasurement};

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    pub steps: Vec<StepSpec>,
    /// Valid samples a session needs before it can build a profile.
    pub min_profile_samples: usize,
    pub min_scale: f64,
    pub max_scale: f64,
    pub accuracy_history_size: usize,
    /// Accuracy entries averaged into `overall_accuracy`.
    pub accuracy_window: usize,
    /// Learning parameters given to new profiles.
    pub learning: LearningParams,
    /// Finished sessions kept for lookup.
    pub finished_session_history: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            min_profile_samples: 5,
            min_scale: 0.5,
            max_scale: 2.0,
            accuracy_history_size: 50,
            accuracy_window: 10,
            learning: LearningParams::default(),
            finished_session_history: 20,
        }
    }
}

impl CalibrationConfig {
    pub fn with_steps(mut self, steps: Vec<StepSpec>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_min_profile_samples(mut self, samples: usize) -> Self {
        self.min_profile_samples = samples;
        self
    }

    pub fn with_scale_bounds(mut self, min_scale: f64, max_scale: f64) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    /// Reject settings a session could never satisfy or that break the
    /// scale clamp.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !(self.min_scale.is_finite() && self.min_scale > 0.0) {
            return Err(invalid_setting("min_scale", self.min_scale, "must be positive"));
        }
        if !self.max_scale.is_finite() || self.max_scale < self.min_scale {
            return Err(invalid_setting("max_scale", self.max_scale, "must not be below min_scale"));
        }
        if self.steps.is_empty() {
            return Err(invalid_setting("steps", 0, "at least one step is required"));
        }
        let required: usize = self.steps.iter().map(|s| s.min_samples).sum();
        if self.min_profile_samples > required {
            return Err(invalid_setting(
                "min_profile_samples",
                self.min_profile_samples,
                "exceeds the valid samples the steps collect",
            ));
        }
        Ok(())
    }
}

fn invalid_setting(key: &'static str, value: impl ToString, reason: &'static str) -> CalibrationError {
    CalibrationError::InvalidConfig {
        key,
        value: value.to_string(),
        reason,
    }
}

/// Result of applying a user's profile to a raw measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationOutcome {
    pub measurement: RawMeasurement,
    /// `false` when the user has no profile and `measurement` is the input.
    pub applied: bool,
    pub profile_version: Option<u32>,
}

#[derive(Debug, Default)]
struct SessionTotals {
    total: usize,
    completed: usize,
    accuracy_sum: f64,
    quality_score_sum: f64,
}

/// Runs calibration sessions and maintains per-user profiles.
///
/// Each user has at most one active session. Samples for one session are
/// serialized by that session's lock; different sessions proceed
/// independently.
pub struct CalibrationEngine {
    config: CalibrationConfig,
    store: Arc<ProfileStore>,
    sessions: DashMap<String, Arc<Mutex<CalibrationSession>>>,
    active_by_user: DashMap<String, String>,
    finished: Mutex<BoundedHistory<CalibrationSession>>,
    totals: Mutex<SessionTotals>,
    next_id: AtomicU64,
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new(CalibrationConfig::default(), Arc::new(ProfileStore::new()))
    }
}

impl CalibrationEngine {
    pub fn new(config: CalibrationConfig, store: Arc<ProfileStore>) -> Self {
        let finished = BoundedHistory::new(config.finished_session_history);
        Self {
            config,
            store,
            sessions: DashMap::new(),
            active_by_user: DashMap::new(),
            finished: Mutex::new(finished),
            totals: Mutex::new(SessionTotals::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    pub fn profile(&self, user_id: &str) -> Option<CalibrationProfile> {
        self.store.get(user_id)
    }

    /// Open a session for `user_id`.
    ///
    /// # Errors
    ///
    /// [`CalibrationError::SessionConflict`] if the user already has an
    /// active session.
    pub fn start_session(&self, user_id: &str) -> Result<CalibrationSession, CalibrationError> {
        let session_id = format!(
            "cal_{}_{}",
            Utc::now().timestamp_millis(),
            self.next_id.fetch_add(1, Ordering::Relaxed)
        );

        let session = match self.active_by_user.entry(user_id.to_string()) {
            Entry::Occupied(existing) => {
                return Err(CalibrationError::SessionConflict {
                    user_id: user_id.to_string(),
                    session_id: existing.get().clone(),
                });
            }
            Entry::Vacant(slot) => {
                let session = CalibrationSession::new(
                    session_id.clone(),
                    user_id.to_string(),
                    self.config.steps.clone(),
                );
                self.sessions
                    .insert(session_id.clone(), Arc::new(Mutex::new(session.clone())));
                slot.insert(session_id.clone());
                session
            }
        };

        tracing::info!(session = %session_id, user = %user_id, steps = session.steps.len(), "Calibration session started");
        Ok(session)
    }

    /// Submit a sample to the session's active step.
    ///
    /// Rejected samples come back as `accepted: false` with feedback.
    /// Completing the last step finalizes the session and versions the
    /// profile.
    ///
    /// # Errors
    ///
    /// - [`CalibrationError::InsufficientSamples`] when the step used up
    ///   its attempts, or the final step completed with too few valid
    ///   samples for a profile. Either way the session is now failed.
    /// - [`CalibrationError::SessionNotFound`],
    ///   [`CalibrationError::SessionNotActive`] or
    ///   [`CalibrationError::NoActiveStep`] for misdirected samples.
    pub fn submit_sample(
        &self,
        session_id: &str,
        sample: CalibrationSample,
    ) -> Result<SampleOutcome, CalibrationError> {
        let handle = self.live_session(session_id)?;
        let mut session = handle.lock();
        Self::ensure_active(&session)?;
        if session.active_step().is_none() {
            return Err(CalibrationError::NoActiveStep(session_id.to_string()));
        }

        let step_index = session.current_step;
        let (progress, feedback) = session.submit(sample);
        tracing::debug!(
            session = %session_id,
            step = step_index,
            progress = ?progress,
            "Calibration sample submitted"
        );

        match progress {
            StepProgress::AttemptsExhausted => {
                let (valid, required) = session
                    .steps
                    .get(step_index)
                    .map(|s| (s.valid_samples(), s.spec.min_samples))
                    .unwrap_or_default();
                session.finish(SessionStatus::Failed, Some(feedback));
                let snapshot = session.clone();
                drop(session);
                self.retire(snapshot);
                Err(CalibrationError::InsufficientSamples { valid, required })
            }
            StepProgress::AllStepsCompleted => {
                if let Err(e) = self.finalize(&mut session) {
                    session.finish(SessionStatus::Failed, Some(e.to_string()));
                    let snapshot = session.clone();
                    drop(session);
                    self.retire(snapshot);
                    return Err(e);
                }
                let snapshot = session.clone();
                drop(session);
                self.retire(snapshot);
                Ok(SampleOutcome {
                    accepted: true,
                    feedback,
                    step_complete: true,
                    step_index,
                    session_status: SessionStatus::Completed,
                })
            }
            StepProgress::StepCompleted | StepProgress::Accepted | StepProgress::Rejected => {
                Ok(SampleOutcome {
                    accepted: progress != StepProgress::Rejected,
                    feedback,
                    step_complete: progress == StepProgress::StepCompleted,
                    step_index,
                    session_status: session.status,
                })
            }
        }
    }

    /// Finalize a session early from the valid samples collected so far.
    ///
    /// # Errors
    ///
    /// [`CalibrationError::InsufficientSamples`] with fewer than
    /// `min_profile_samples` valid samples; the session stays active.
    pub fn complete_session(&self, session_id: &str) -> Result<CalibrationProfile, CalibrationError> {
        let handle = self.live_session(session_id)?;
        let mut session = handle.lock();
        Self::ensure_active(&session)?;
        let profile = self.finalize(&mut session)?;
        let snapshot = session.clone();
        drop(session);
        self.retire(snapshot);
        Ok(profile)
    }

    pub fn cancel_session(&self, session_id: &str) -> Result<CalibrationSession, CalibrationError> {
        self.terminate(session_id, SessionStatus::Cancelled, None)
    }

    pub fn fail_session(
        &self,
        session_id: &str,
        reason: impl Into<String>,
    ) -> Result<CalibrationSession, CalibrationError> {
        self.terminate(session_id, SessionStatus::Failed, Some(reason.into()))
    }

    /// Snapshot of a live or recently finished session.
    pub fn session(&self, session_id: &str) -> Option<CalibrationSession> {
        if let Some(handle) = self.sessions.get(session_id) {
            return Some(handle.value().lock().clone());
        }
        self.finished
            .lock()
            .iter()
            .rev()
            .find(|s| s.id == session_id)
            .cloned()
    }

    pub fn active_session(&self, user_id: &str) -> Option<CalibrationSession> {
        let session_id = self.active_by_user.get(user_id)?.value().clone();
        self.session(&session_id)
    }

    /// Apply the user's profile to a raw measurement. Without a profile the
    /// input is returned unchanged with `applied: false`.
    pub fn apply_user_calibration(&self, user_id: &str, raw: &RawMeasurement) -> CalibrationOutcome {
        match self.store.get(user_id) {
            Some(profile) => CalibrationOutcome {
                measurement: profile.apply(raw),
                applied: true,
                profile_version: Some(profile.version),
            },
            None => CalibrationOutcome {
                measurement: *raw,
                applied: false,
                profile_version: None,
            },
        }
    }

    /// Move the profile's offsets toward user-confirmed values.
    ///
    /// Each confirmed field shifts its offset by `feedback_weight` of the
    /// remaining error. The profile version is unchanged.
    pub fn apply_reference_feedback(
        &self,
        user_id: &str,
        measured: &RawMeasurement,
        confirmed: KnownMeasurements,
    ) -> Result<CalibrationProfile, CalibrationError> {
        let accuracy_window = self.config.accuracy_window;
        let profile = self
            .store
            .modify(user_id, |profile| {
                let calibrated = profile.apply(measured);
                let weight = profile.learning.feedback_weight;
                let mut errors = Vec::new();

                if let Some(height) = confirmed.height_cm {
                    let error = height - calibrated.height_cm;
                    if profile.learning.learning_enabled {
                        profile.offsets.height += error * weight;
                    }
                    if height > 0.0 {
                        errors.push((error / height).abs());
                    }
                }
                if let Some(shoulder) = confirmed.shoulder_width_cm {
                    let error = shoulder - calibrated.shoulder_width_cm;
                    if profile.learning.learning_enabled {
                        profile.offsets.shoulder_width += error * weight;
                    }
                    if shoulder > 0.0 {
                        errors.push((error / shoulder).abs());
                    }
                }

                let now = Utc::now();
                profile.reference_measurements.push(ReferenceMeasurement {
                    height_cm: confirmed.height_cm,
                    shoulder_width_cm: confirmed.shoulder_width_cm,
                    confidence: measured.confidence,
                    recorded_at: now,
                });
                if !errors.is_empty() {
                    let relative_error = errors.iter().sum::<f64>() / errors.len() as f64;
                    profile.accuracy_history.push(AccuracyEntry {
                        accuracy: (1.0 - relative_error).max(0.0),
                        method: "reference_feedback".to_string(),
                        session_id: None,
                        recorded_at: now,
                    });
                    refresh_quality(profile, accuracy_window);
                }
                profile.updated_at = now;
            })
            .ok_or_else(|| CalibrationError::ProfileNotFound(user_id.to_string()))?;

        tracing::info!(
            user = %user_id,
            height_offset = profile.offsets.height,
            shoulder_offset = profile.offsets.shoulder_width,
            "Reference feedback applied"
        );
        Ok(profile)
    }

    pub fn statistics(&self) -> CalibrationStatistics {
        let totals = self.totals.lock();
        let (average_accuracy, average_quality) = if totals.completed > 0 {
            let n = totals.completed as f64;
            (
                totals.accuracy_sum / n,
                Quality::from_average_score(totals.quality_score_sum / n),
            )
        } else {
            (0.0, Quality::Poor)
        };
        CalibrationStatistics {
            total_sessions: totals.total,
            completed_sessions: totals.completed,
            average_accuracy,
            average_quality,
            user_count: self.store.len(),
        }
    }

    /// Score a sample's measurement plausibility and capture conditions.
    pub fn analyze_sample_quality(sample: &CalibrationSample) -> SampleQualityReport {
        let m = &sample.measurement;
        let context = &sample.context;
        let mut score = 0;

        if (30.0..=60.0).contains(&m.shoulder_width_cm) {
            score += 25;
        }
        if (120.0..=220.0).contains(&m.height_cm) {
            score += 25;
        }
        score += match context.lighting {
            Quality::Excellent => 20,
            Quality::Good => 15,
            Quality::Fair => 10,
            Quality::Poor => 0,
        };
        score += match context.distance {
            DistanceFit::Optimal => 15,
            DistanceFit::TooClose | DistanceFit::TooFar => 5,
        };
        score += match context.pose {
            PoseFit::Optimal => 15,
            PoseFit::Acceptable => 10,
            PoseFit::Poor => 0,
        };

        let quality = if score >= 80 {
            Quality::Excellent
        } else if score >= 60 {
            Quality::Good
        } else if score >= 40 {
            Quality::Fair
        } else {
            Quality::Poor
        };

        let mut feedback = Vec::new();
        if context.lighting == Quality::Poor {
            feedback.push("Improve lighting conditions");
        }
        match context.distance {
            DistanceFit::TooClose => feedback.push("Move further from camera"),
            DistanceFit::TooFar => feedback.push("Move closer to camera"),
            DistanceFit::Optimal => {}
        }
        if context.pose == PoseFit::Poor {
            feedback.push("Adjust your pose - stand straight");
        }
        feedback.push(match quality {
            Quality::Excellent => "Great measurement quality!",
            Quality::Good => "Good measurement, keep going",
            Quality::Fair => "Measurement acceptable, but could be better",
            Quality::Poor => "Please retake measurement with better conditions",
        });

        SampleQualityReport {
            score,
            quality,
            feedback: feedback.join(". "),
        }
    }

    fn live_session(&self, session_id: &str) -> Result<Arc<Mutex<CalibrationSession>>, CalibrationError> {
        if let Some(handle) = self.sessions.get(session_id) {
            return Ok(Arc::clone(handle.value()));
        }
        match self.session(session_id) {
            Some(finished) => Err(CalibrationError::SessionNotActive {
                session_id: session_id.to_string(),
                status: finished.status,
            }),
            None => Err(CalibrationError::SessionNotFound(session_id.to_string())),
        }
    }

    fn ensure_active(session: &CalibrationSession) -> Result<(), CalibrationError> {
        if session.is_active() {
            Ok(())
        } else {
            Err(CalibrationError::SessionNotActive {
                session_id: session.id.clone(),
                status: session.status,
            })
        }
    }

    fn terminate(
        &self,
        session_id: &str,
        status: SessionStatus,
        reason: Option<String>,
    ) -> Result<CalibrationSession, CalibrationError> {
        let handle = self.live_session(session_id)?;
        let mut session = handle.lock();
        Self::ensure_active(&session)?;
        session.finish(status, reason);
        let snapshot = session.clone();
        drop(session);
        self.retire(snapshot.clone());
        Ok(snapshot)
    }

    /// Move a terminal session out of the live set and count it.
    fn retire(&self, session: CalibrationSession) {
        self.sessions.remove(&session.id);
        self.active_by_user
            .remove_if(&session.user_id, |_, id| *id == session.id);

        {
            let mut totals = self.totals.lock();
            totals.total += 1;
            if session.status == SessionStatus::Completed {
                totals.completed += 1;
                totals.accuracy_sum += session.accuracy;
                totals.quality_score_sum += session.quality.score();
            }
        }

        match session.status {
            SessionStatus::Failed => tracing::warn!(
                session = %session.id,
                user = %session.user_id,
                reason = session.failure.as_deref().unwrap_or("unspecified"),
                "Calibration session failed"
            ),
            status => tracing::info!(
                session = %session.id,
                user = %session.user_id,
                status = %status,
                accuracy = session.accuracy,
                "Calibration session finished"
            ),
        }
        self.finished.lock().push(session);
    }

    /// Fold the session's valid samples into the user's profile and mark
    /// the session completed.
    fn finalize(&self, session: &mut CalibrationSession) -> Result<CalibrationProfile, CalibrationError> {
        let samples: Vec<&CalibrationSample> = session.valid_samples().collect();
        if samples.len() < self.config.min_profile_samples {
            tracing::warn!(
                session = %session.id,
                valid = samples.len(),
                required = self.config.min_profile_samples,
                "Not enough valid samples to finalize calibration"
            );
            return Err(CalibrationError::InsufficientSamples {
                valid: samples.len(),
                required: self.config.min_profile_samples,
            });
        }

        let weight: f64 = samples.iter().map(|s| s.measurement.confidence.max(0.0)).sum();
        let weighted_mean = |f: fn(&RawMeasurement) -> f64| {
            if weight > 0.0 {
                samples
                    .iter()
                    .map(|s| f(&s.measurement) * s.measurement.confidence.max(0.0))
                    .sum::<f64>()
                    / weight
            } else {
                samples.iter().map(|s| f(&s.measurement)).sum::<f64>() / samples.len() as f64
            }
        };
        let measured_height = weighted_mean(|m| m.height_cm);
        let measured_shoulder = weighted_mean(|m| m.shoulder_width_cm);

        let known = session
            .steps
            .iter()
            .filter(|step| step.spec.accepts_known)
            .flat_map(|step| step.samples.iter())
            .filter(|s| s.valid)
            .rev()
            .find_map(|s| s.sample.known.filter(|k| !k.is_empty()));
        let session_scale = FieldFactors {
            height: scale_for(known.and_then(|k| k.height_cm), measured_height),
            shoulder_width: scale_for(known.and_then(|k| k.shoulder_width_cm), measured_shoulder),
        };

        let (min_scale, max_scale) = (self.config.min_scale, self.config.max_scale);
        let clamp = |v: f64| v.max(min_scale).min(max_scale);
        let session_ref = &*session;
        let profile = self.store.update_version(&session_ref.user_id, |existing| {
            let now = Utc::now();
            let mut profile = match existing {
                Some(mut existing) => {
                    let total = existing.sample_weight + weight;
                    if total > 0.0 {
                        let blend = |old: f64, new: f64| {
                            clamp((old * existing.sample_weight + new * weight) / total)
                        };
                        existing.scale_factors = FieldFactors {
                            height: blend(existing.scale_factors.height, session_scale.height),
                            shoulder_width: blend(
                                existing.scale_factors.shoulder_width,
                                session_scale.shoulder_width,
                            ),
                        };
                    }
                    existing.sample_weight = total;
                    existing.version += 1;
                    existing
                }
                None => CalibrationProfile {
                    user_id: session_ref.user_id.clone(),
                    version: 1,
                    created_at: now,
                    updated_at: now,
                    physical: PhysicalProfile {
                        estimated_height_cm: 0.0,
                        estimated_shoulder_width_cm: 0.0,
                        body_type: BodyType::Average,
                        shoulder_to_height_ratio: 0.25,
                    },
                    scale_factors: FieldFactors {
                        height: clamp(session_scale.height),
                        shoulder_width: clamp(session_scale.shoulder_width),
                    },
                    offsets: FieldFactors::ZERO_OFFSET,
                    sample_weight: weight,
                    reference_measurements: Vec::new(),
                    accuracy_history: BoundedHistory::new(self.config.accuracy_history_size),
                    learning: self.config.learning.clone(),
                    quality: QualityMetrics {
                        overall_accuracy: session_ref.accuracy,
                        consistency_score: 1.0,
                        reliability_score: session_ref.confidence,
                        last_validation: now,
                    },
                },
            };

            if let Some(known) = known {
                profile.reference_measurements.push(ReferenceMeasurement {
                    height_cm: known.height_cm,
                    shoulder_width_cm: known.shoulder_width_cm,
                    confidence: session_ref.confidence,
                    recorded_at: now,
                });
            }
            profile.accuracy_history.push(AccuracyEntry {
                accuracy: session_ref.accuracy,
                method: "calibration_session".to_string(),
                session_id: Some(session_ref.id.clone()),
                recorded_at: now,
            });
            refresh_quality(&mut profile, self.config.accuracy_window);
            profile.quality.reliability_score = session_ref.confidence;

            let height = measured_height * profile.scale_factors.height + profile.offsets.height;
            let shoulder = measured_shoulder * profile.scale_factors.shoulder_width
                + profile.offsets.shoulder_width;
            let ratio = if height > 0.0 { shoulder / height } else { 0.25 };
            profile.physical = PhysicalProfile {
                estimated_height_cm: height,
                estimated_shoulder_width_cm: shoulder,
                body_type: BodyType::from_shoulder_ratio(ratio),
                shoulder_to_height_ratio: ratio,
            };
            profile.updated_at = now;
            profile
        })?;
        session.finish(SessionStatus::Completed, None);

        tracing::info!(
            user = %profile.user_id,
            version = profile.version,
            height_scale = profile.scale_factors.height,
            shoulder_scale = profile.scale_factors.shoulder_width,
            body_type = %profile.physical.body_type,
            "Calibration profile versioned"
        );
        Ok(profile)
    }
}

/// Known over measured, or identity without a usable reference.
fn scale_for(known: Option<f64>, measured: f64) -> f64 {
    match known {
        Some(known) if known > 0.0 && measured > 0.0 => known / measured,
        _ => 1.0,
    }
}

fn refresh_quality(profile: &mut CalibrationProfile, window: usize) {
    let recent: Vec<f64> = profile
        .accuracy_history
        .recent(window)
        .map(|e| e.accuracy)
        .collect();
    if recent.is_empty() {
        return;
    }
    let mean = recent.iter().sum::<f64>() / recent.len() as f64;
    let variance = recent.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / recent.len() as f64;
    profile.quality.overall_accuracy = mean;
    profile.quality.consistency_score = (1.0 - variance.sqrt()).clamp(0.0, 1.0);
    profile.quality.last_validation = Utc::now();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::types::SampleContext;

    fn create_test_engine() -> CalibrationEngine {
        CalibrationEngine::default()
    }

    fn sample(shoulder: f64, height: f64) -> CalibrationSample {
        CalibrationSample::new(RawMeasurement::new(shoulder, height, 0.95), Quality::Good)
    }

    fn poor_pose(shoulder: f64, height: f64) -> CalibrationSample {
        sample(shoulder, height).with_context(SampleContext {
            pose: PoseFit::Poor,
            ..Default::default()
        })
    }

    /// Drive a default session to completion, attaching `known` at the
    /// reference step.
    fn run_default_session(
        engine: &CalibrationEngine,
        user: &str,
        known: Option<KnownMeasurements>,
    ) -> CalibrationSession {
        let session = engine.start_session(user).unwrap();
        for _ in 0..30 {
            let current = engine.session(&session.id).unwrap();
            if !current.is_active() {
                return current;
            }
            let mut next = sample(44.0, 175.0);
            if current.steps[current.current_step].spec.name == "reference_measurements" {
                if let Some(known) = known {
                    next = next.with_known(known);
                }
            }
            engine.submit_sample(&session.id, next).unwrap();
        }
        engine.session(&session.id).unwrap()
    }

    #[test]
    fn test_full_session_creates_profile() {
        let engine = create_test_engine();
        let known = KnownMeasurements {
            height_cm: Some(180.0),
            shoulder_width_cm: None,
        };
        let session = run_default_session(&engine, "alice", Some(known));

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.accuracy, 1.0);
        assert_eq!(session.quality, Quality::Excellent);

        let profile = engine.profile("alice").unwrap();
        assert_eq!(profile.version, 1);
        assert!((profile.scale_factors.height - 180.0 / 175.0).abs() < 1e-9);
        assert_eq!(profile.scale_factors.shoulder_width, 1.0);
        assert_eq!(profile.reference_measurements.len(), 1);
        assert_eq!(profile.accuracy_history.len(), 1);
        assert!((profile.physical.estimated_height_cm - 180.0).abs() < 1e-9);
        assert!(engine.active_session("alice").is_none());
    }

    #[test]
    fn test_noisy_samples_average_out() {
        use rand::Rng;

        let engine = create_test_engine();
        let mut rng = rand::rng();
        let session = engine.start_session("erin").unwrap();
        for _ in 0..30 {
            let current = engine.session(&session.id).unwrap();
            if !current.is_active() {
                break;
            }
            let height = 175.0 + rng.random_range(-1.0..1.0);
            let shoulder = 44.0 + rng.random_range(-0.5..0.5);
            let mut next = sample(shoulder, height);
            if current.steps[current.current_step].spec.name == "reference_measurements" {
                next = next.with_known(KnownMeasurements {
                    height_cm: Some(180.0),
                    shoulder_width_cm: None,
                });
            }
            engine.submit_sample(&session.id, next).unwrap();
        }

        let profile = engine.profile("erin").unwrap();
        assert!((profile.scale_factors.height - 180.0 / 175.0).abs() < 0.01);
        assert_eq!(profile.scale_factors.shoulder_width, 1.0);
    }

    #[test]
    fn test_second_session_bumps_version_and_blends() {
        let engine = create_test_engine();
        let known = KnownMeasurements {
            height_cm: Some(180.0),
            shoulder_width_cm: None,
        };
        run_default_session(&engine, "bob", Some(known));
        run_default_session(&engine, "bob", None);

        let profile = engine.profile("bob").unwrap();
        assert_eq!(profile.version, 2);
        // equal session weights: halfway between 180/175 and 1.0
        let expected = (180.0 / 175.0 + 1.0) / 2.0;
        assert!((profile.scale_factors.height - expected).abs() < 1e-9);
    }

    #[test]
    fn test_second_active_session_is_rejected() {
        let engine = create_test_engine();
        let first = engine.start_session("carol").unwrap();
        let err = engine.start_session("carol").unwrap_err();
        match err {
            CalibrationError::SessionConflict { session_id, .. } => assert_eq!(session_id, first.id),
            other => panic!("unexpected error: {other}"),
        }

        engine.cancel_session(&first.id).unwrap();
        assert!(engine.start_session("carol").is_ok());
    }

    #[test]
    fn test_user_without_profile_is_unchanged() {
        let engine = create_test_engine();
        let raw = RawMeasurement::new(44.0, 175.0, 0.8);
        let outcome = engine.apply_user_calibration("nobody", &raw);
        assert!(!outcome.applied);
        assert_eq!(outcome.measurement, raw);
        assert!(outcome.profile_version.is_none());
    }

    #[test]
    fn test_step_with_two_valid_samples_is_incomplete() {
        let config = CalibrationConfig::default().with_steps(vec![
            StepSpec::new("front_pose", 3, 5, 0.7),
            StepSpec::new("side_pose", 3, 5, 0.7),
        ]);
        let engine = CalibrationEngine::new(config, Arc::new(ProfileStore::new()));
        let session = engine.start_session("dave").unwrap();

        engine.submit_sample(&session.id, sample(44.0, 175.0)).unwrap();
        let rejected = engine.submit_sample(&session.id, poor_pose(44.0, 175.0)).unwrap();
        let last = engine.submit_sample(&session.id, sample(44.0, 175.0)).unwrap();

        assert!(!rejected.accepted);
        assert_eq!(rejected.feedback, "Please maintain a standing pose");
        assert!(!last.step_complete);
        let snapshot = engine.session(&session.id).unwrap();
        assert_eq!(snapshot.steps[0].valid_samples(), 2);
        assert_eq!(snapshot.current_step, 0);
    }

    #[test]
    fn test_exhausted_step_fails_session() {
        let config = CalibrationConfig::default().with_steps(vec![StepSpec::new("front_pose", 1, 1, 0.7)]);
        let engine = CalibrationEngine::new(config, Arc::new(ProfileStore::new()));
        let session = engine.start_session("erin").unwrap();

        engine.submit_sample(&session.id, poor_pose(44.0, 175.0)).unwrap();
        let err = engine
            .submit_sample(&session.id, poor_pose(44.0, 175.0))
            .unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::InsufficientSamples { valid: 0, required: 1 }
        ));
        assert_eq!(engine.session(&session.id).unwrap().status, SessionStatus::Failed);
        assert!(matches!(
            engine.submit_sample(&session.id, sample(44.0, 175.0)),
            Err(CalibrationError::SessionNotActive { .. })
        ));
    }

    #[test]
    fn test_last_step_without_enough_samples_fails_session() {
        let config = CalibrationConfig::default().with_steps(vec![StepSpec::new("a", 1, 1, 0.7)]);
        let engine = CalibrationEngine::new(config, Arc::new(ProfileStore::new()));
        let session = engine.start_session("frank").unwrap();

        let err = engine.submit_sample(&session.id, sample(44.0, 175.0)).unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::InsufficientSamples { valid: 1, required: 5 }
        ));

        let finished = engine.session(&session.id).unwrap();
        assert_eq!(finished.status, SessionStatus::Failed);
        assert!(finished.failure.is_some());
        assert!(engine.active_session("frank").is_none());
        assert!(engine.profile("frank").is_none());
        assert!(matches!(
            engine.complete_session(&session.id),
            Err(CalibrationError::SessionNotActive { .. })
        ));
        assert!(engine.start_session("frank").is_ok());
    }

    #[test]
    fn test_validate_config() {
        assert!(CalibrationConfig::default().validate().is_ok());

        let inverted = CalibrationConfig::default().with_scale_bounds(3.0, 2.0);
        assert!(matches!(
            inverted.validate(),
            Err(CalibrationError::InvalidConfig { key: "max_scale", .. })
        ));
        let zero = CalibrationConfig::default().with_scale_bounds(0.0, 2.0);
        assert!(matches!(
            zero.validate(),
            Err(CalibrationError::InvalidConfig { key: "min_scale", .. })
        ));
        let unreachable = CalibrationConfig::default()
            .with_steps(vec![StepSpec::new("a", 1, 1, 0.7)])
            .with_min_profile_samples(5);
        assert!(matches!(
            unreachable.validate(),
            Err(CalibrationError::InvalidConfig { key: "min_profile_samples", .. })
        ));
        let empty = CalibrationConfig::default().with_steps(Vec::new());
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_inverted_scale_bounds_do_not_panic() {
        let config = CalibrationConfig::default()
            .with_steps(vec![StepSpec::new("a", 1, 1, 0.7)])
            .with_min_profile_samples(1)
            .with_scale_bounds(3.0, 2.0);
        let engine = CalibrationEngine::new(config, Arc::new(ProfileStore::new()));
        let session = engine.start_session("gina").unwrap();

        let outcome = engine.submit_sample(&session.id, sample(44.0, 175.0)).unwrap();
        assert_eq!(outcome.session_status, SessionStatus::Completed);
        let profile = engine.profile("gina").unwrap();
        assert_eq!(profile.scale_factors.height, 2.0);
    }

    #[test]
    fn test_known_values_outside_reference_step_are_ignored() {
        let engine = create_test_engine();
        let known = KnownMeasurements {
            height_cm: Some(190.0),
            shoulder_width_cm: Some(50.0),
        };
        let session = engine.start_session("hank").unwrap();
        for _ in 0..30 {
            let current = engine.session(&session.id).unwrap();
            if !current.is_active() {
                break;
            }
            let mut next = sample(44.0, 175.0);
            if current.steps[current.current_step].spec.name == "front_pose" {
                next = next.with_known(known);
            }
            engine.submit_sample(&session.id, next).unwrap();
        }

        assert_eq!(engine.session(&session.id).unwrap().status, SessionStatus::Completed);
        let profile = engine.profile("hank").unwrap();
        assert_eq!(profile.scale_factors.height, 1.0);
        assert_eq!(profile.scale_factors.shoulder_width, 1.0);
        assert!(profile.reference_measurements.is_empty());
    }

    #[test]
    fn test_early_completion_needs_five_valid_samples() {
        let engine = create_test_engine();
        let session = engine.start_session("frank").unwrap();
        for _ in 0..4 {
            engine.submit_sample(&session.id, sample(44.0, 175.0)).unwrap();
        }
        assert!(matches!(
            engine.complete_session(&session.id),
            Err(CalibrationError::InsufficientSamples { valid: 4, required: 5 })
        ));
        assert!(engine.session(&session.id).unwrap().is_active());

        engine.submit_sample(&session.id, sample(44.0, 175.0)).unwrap();
        let profile = engine.complete_session(&session.id).unwrap();
        assert_eq!(profile.version, 1);
        assert_eq!(
            engine.session(&session.id).unwrap().status,
            SessionStatus::Completed
        );
    }

    #[test]
    fn test_unknown_session() {
        let engine = create_test_engine();
        assert!(matches!(
            engine.submit_sample("cal_missing", sample(44.0, 175.0)),
            Err(CalibrationError::SessionNotFound(_))
        ));
        assert!(engine.session("cal_missing").is_none());
    }

    #[test]
    fn test_fail_session_records_reason() {
        let engine = create_test_engine();
        let session = engine.start_session("gina").unwrap();
        let failed = engine.fail_session(&session.id, "camera lost").unwrap();
        assert_eq!(failed.status, SessionStatus::Failed);
        assert_eq!(failed.failure.as_deref(), Some("camera lost"));
        assert!(matches!(
            engine.cancel_session(&session.id),
            Err(CalibrationError::SessionNotActive { .. })
        ));
    }

    #[test]
    fn test_reference_feedback_moves_offsets_without_versioning() {
        let engine = create_test_engine();
        run_default_session(&engine, "hank", None);

        let measured = RawMeasurement::new(44.0, 175.0, 0.9);
        let confirmed = KnownMeasurements {
            height_cm: Some(185.0),
            shoulder_width_cm: None,
        };
        let profile = engine
            .apply_reference_feedback("hank", &measured, confirmed)
            .unwrap();

        assert_eq!(profile.version, 1);
        assert!((profile.offsets.height - 3.0).abs() < 1e-9);
        assert_eq!(profile.offsets.shoulder_width, 0.0);
        assert_eq!(profile.accuracy_history.len(), 2);

        assert!(matches!(
            engine.apply_reference_feedback("nobody", &measured, confirmed),
            Err(CalibrationError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_statistics() {
        let engine = create_test_engine();
        run_default_session(&engine, "ivy", None);
        let cancelled = engine.start_session("jack").unwrap();
        engine.cancel_session(&cancelled.id).unwrap();

        let stats = engine.statistics();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.completed_sessions, 1);
        assert_eq!(stats.average_accuracy, 1.0);
        assert_eq!(stats.average_quality, Quality::Excellent);
        assert_eq!(stats.user_count, 1);
    }

    #[test]
    fn test_analyze_sample_quality() {
        let report = CalibrationEngine::analyze_sample_quality(&sample(44.0, 175.0));
        // 25 + 25 + 15 + 15 + 15
        assert_eq!(report.score, 95);
        assert_eq!(report.quality, Quality::Excellent);
        assert_eq!(report.feedback, "Great measurement quality!");

        let awkward = sample(20.0, 175.0).with_context(SampleContext {
            lighting: Quality::Poor,
            distance: DistanceFit::TooFar,
            pose: PoseFit::Acceptable,
            stability: Quality::Fair,
        });
        let report = CalibrationEngine::analyze_sample_quality(&awkward);
        assert_eq!(report.score, 40);
        assert_eq!(report.quality, Quality::Fair);
        assert_eq!(
            report.feedback,
            "Improve lighting conditions. Move closer to camera. Measurement acceptable, but could be better"
        );
    }

    #[test]
    fn test_versions_strictly_increase() {
        let engine = create_test_engine();
        let mut last = 0;
        for _ in 0..3 {
            run_default_session(&engine, "kate", None);
            let version = engine.profile("kate").unwrap().version;
            assert!(version > last);
            last = version;
        }
        assert_eq!(last, 3);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn apply_user_calibration_is_idempotent(
                shoulder in 20.0f64..70.0,
                height in 100.0f64..230.0,
                confidence in 0.0f64..1.0,
                known_height in 150.0f64..200.0,
            ) {
                let engine = CalibrationEngine::default();
                let session = engine.start_session("prop").unwrap();
                for _ in 0..5 {
                    let s = sample(44.0, 175.0).with_known(KnownMeasurements {
                        height_cm: Some(known_height),
                        shoulder_width_cm: None,
                    });
                    engine.submit_sample(&session.id, s).unwrap();
                }
                engine.complete_session(&session.id).unwrap();

                let raw = RawMeasurement::new(shoulder, height, confidence);
                let first = engine.apply_user_calibration("prop", &raw);
                let second = engine.apply_user_calibration("prop", &raw);
                prop_assert!(first.applied);
                prop_assert_eq!(&first, &second);
                prop_assert!(first.measurement.confidence <= 1.0);
            }
        }
    }
}
