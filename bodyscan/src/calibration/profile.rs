//! Per-user calibration profiles and their keyed store.

use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::error::CalibrationError;
use crate::history::BoundedHistory;
use crate::measurement::RawMeasurement;

/// Coarse build derived from the shoulder to height ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    Slim,
    Average,
    Athletic,
    Broad,
}

impl BodyType {
    pub fn from_shoulder_ratio(ratio: f64) -> Self {
        if ratio < 0.23 {
            BodyType::Slim
        } else if ratio < 0.26 {
            BodyType::Average
        } else if ratio < 0.28 {
            BodyType::Athletic
        } else {
            BodyType::Broad
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BodyType::Slim => "slim",
            BodyType::Average => "average",
            BodyType::Athletic => "athletic",
            BodyType::Broad => "broad",
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldFactors {
    pub height: f64,
    pub shoulder_width: f64,
}

impl FieldFactors {
    pub const IDENTITY_SCALE: Self = Self {
        height: 1.0,
        shoulder_width: 1.0,
    };

    pub const ZERO_OFFSET: Self = Self {
        height: 0.0,
        shoulder_width: 0.0,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalProfile {
    pub estimated_height_cm: f64,
    pub estimated_shoulder_width_cm: f64,
    pub body_type: BodyType,
    pub shoulder_to_height_ratio: f64,
}

/// A user-confirmed measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMeasurement {
    pub height_cm: Option<f64>,
    pub shoulder_width_cm: Option<f64>,
    pub confidence: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyEntry {
    pub accuracy: f64,
    /// `calibration_session` or `reference_feedback`.
    pub method: String,
    pub session_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningParams {
    pub adaptation_rate: f64,
    pub confidence_threshold: f64,
    pub min_samples: usize,
    /// Share of a reference error folded into the offsets per feedback.
    pub feedback_weight: f64,
    pub learning_enabled: bool,
}

impl Default for LearningParams {
    fn default() -> Self {
        Self {
            adaptation_rate: 0.05,
            confidence_threshold: 0.7,
            min_samples: 5,
            feedback_weight: 0.3,
            learning_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Mean of the most recent accuracy entries.
    pub overall_accuracy: f64,
    pub consistency_score: f64,
    /// Mean valid-sample confidence of the latest session.
    pub reliability_score: f64,
    pub last_validation: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub user_id: String,
    /// Strictly increases with every completed session.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub physical: PhysicalProfile,
    pub scale_factors: FieldFactors,
    pub offsets: FieldFactors,
    /// Accumulated sample confidence behind the scale factors.
    pub sample_weight: f64,
    pub reference_measurements: Vec<ReferenceMeasurement>,
    pub accuracy_history: BoundedHistory<AccuracyEntry>,
    pub learning: LearningParams,
    pub quality: QualityMetrics,
}

impl CalibrationProfile {
    /// Scale then offset each field, and weight confidence by the
    /// profile's overall accuracy.
    pub fn apply(&self, raw: &RawMeasurement) -> RawMeasurement {
        RawMeasurement {
            shoulder_width_cm: raw.shoulder_width_cm * self.scale_factors.shoulder_width
                + self.offsets.shoulder_width,
            height_cm: raw.height_cm * self.scale_factors.height + self.offsets.height,
            confidence: (raw.confidence * self.quality.overall_accuracy).min(1.0),
            timestamp: raw.timestamp,
        }
    }

    /// Mean accuracy of the newest `window` history entries.
    pub fn recent_accuracy(&self, window: usize) -> Option<f64> {
        let recent: Vec<f64> = self.accuracy_history.recent(window).map(|e| e.accuracy).collect();
        (!recent.is_empty()).then(|| recent.iter().sum::<f64>() / recent.len() as f64)
    }
}

/// Keyed, versioned profile storage.
///
/// Profiles are never deleted. Every write through
/// [`ProfileStore::insert_version`] must carry a higher version than the
/// stored one.
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: DashMap<String, CalibrationProfile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<CalibrationProfile> {
        self.profiles.get(user_id).map(|p| p.value().clone())
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.profiles.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.profiles.iter().map(|p| p.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Store a new profile version.
    pub fn insert_version(&self, profile: CalibrationProfile) -> Result<(), CalibrationError> {
        match self.profiles.entry(profile.user_id.clone()) {
            Entry::Occupied(mut existing) => {
                let current = existing.get().version;
                if profile.version <= current {
                    return Err(CalibrationError::StaleVersion {
                        user_id: profile.user_id,
                        current,
                        proposed: profile.version,
                    });
                }
                existing.insert(profile);
            }
            Entry::Vacant(slot) => {
                slot.insert(profile);
            }
        }
        Ok(())
    }

    /// Build the next version of a user's profile from the stored one while
    /// holding its entry, so no other write lands in between.
    pub(crate) fn update_version<F>(
        &self,
        user_id: &str,
        f: F,
    ) -> Result<CalibrationProfile, CalibrationError>
    where
        F: FnOnce(Option<CalibrationProfile>) -> CalibrationProfile,
    {
        match self.profiles.entry(user_id.to_string()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get().version;
                let next = f(Some(slot.get().clone()));
                if next.version <= current {
                    return Err(CalibrationError::StaleVersion {
                        user_id: next.user_id,
                        current,
                        proposed: next.version,
                    });
                }
                slot.insert(next.clone());
                Ok(next)
            }
            Entry::Vacant(slot) => {
                let next = f(None);
                slot.insert(next.clone());
                Ok(next)
            }
        }
    }

    /// Mutate a profile in place without changing its version.
    pub(crate) fn modify<F>(&self, user_id: &str, f: F) -> Option<CalibrationProfile>
    where
        F: FnOnce(&mut CalibrationProfile),
    {
        let mut entry = self.profiles.get_mut(user_id)?;
        let version = entry.version;
        f(entry.value_mut());
        entry.version = version;
        Some(entry.value().clone())
    }

    /// Serialize every profile, ordered by user id.
    pub fn export_json(&self) -> Result<String, CalibrationError> {
        let mut profiles: Vec<CalibrationProfile> =
            self.profiles.iter().map(|p| p.value().clone()).collect();
        profiles.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(serde_json::to_string_pretty(&profiles)?)
    }

    /// Load profiles exported by [`export_json`](Self::export_json).
    ///
    /// Profiles that would not supersede the stored version are skipped.
    /// Returns the number imported.
    pub fn import_json(&self, json: &str) -> Result<usize, CalibrationError> {
        let profiles: Vec<CalibrationProfile> = serde_json::from_str(json)?;
        let mut imported = 0;
        for profile in profiles {
            match self.insert_version(profile) {
                Ok(()) => imported += 1,
                Err(CalibrationError::StaleVersion {
                    user_id,
                    current,
                    proposed,
                }) => {
                    tracing::debug!(user = %user_id, current, proposed, "Skipped stale profile on import");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(imported)
    }
}
