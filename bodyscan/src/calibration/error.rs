//! Calibration error types.

use thiserror::Error;

use super::types::SessionStatus;

/// Errors raised by the calibration engine and profile store.
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// The user already has an active session.
    #[error("user '{user_id}' already has active calibration session '{session_id}'")]
    SessionConflict { user_id: String, session_id: String },

    #[error("calibration session '{0}' not found")]
    SessionNotFound(String),

    /// The session already reached a terminal state.
    #[error("calibration session '{session_id}' is {status}")]
    SessionNotActive {
        session_id: String,
        status: SessionStatus,
    },

    /// Too few valid samples to complete a step or build a profile.
    #[error("insufficient calibration samples: {valid} valid, {required} required")]
    InsufficientSamples { valid: usize, required: usize },

    /// Every step of the session is already complete.
    #[error("calibration session '{0}' has no active step")]
    NoActiveStep(String),

    #[error("no calibration profile for user '{0}'")]
    ProfileNotFound(String),

    /// A profile write did not increase the stored version.
    #[error("profile version {proposed} for user '{user_id}' does not supersede version {current}")]
    StaleVersion {
        user_id: String,
        current: u32,
        proposed: u32,
    },

    /// A configuration value the engine cannot run with.
    #[error("invalid calibration setting {key} = {value}: {reason}")]
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("profile serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display() {
        let err = CalibrationError::SessionConflict {
            user_id: "u1".into(),
            session_id: "cal_1".into(),
        };
        assert_eq!(
            err.to_string(),
            "user 'u1' already has active calibration session 'cal_1'"
        );
    }

    #[test]
    fn test_not_active_display() {
        let err = CalibrationError::SessionNotActive {
            session_id: "cal_1".into(),
            status: SessionStatus::Cancelled,
        };
        assert_eq!(err.to_string(), "calibration session 'cal_1' is cancelled");
    }
}
