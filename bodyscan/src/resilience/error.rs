//! Resilience error types.

use thiserror::Error;

/// Errors raised by circuit breakers and the recovery executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResilienceError {
    /// The breaker for this operation is open; the call was not made.
    #[error("circuit breaker is open for '{operation}'")]
    CircuitOpen { operation: String },

    /// The operation ran and failed.
    #[error("operation '{operation}' failed: {message}")]
    OperationFailed { operation: String, message: String },

    /// Primary and fallback both failed.
    #[error("both primary and fallback operations failed for '{operation}': primary: {primary}; fallback: {fallback}")]
    BothOperationsFailed {
        operation: String,
        primary: String,
        fallback: String,
    },
}

impl ResilienceError {
    /// Name of the operation the error refers to.
    pub fn operation(&self) -> &str {
        match self {
            ResilienceError::CircuitOpen { operation }
            | ResilienceError::OperationFailed { operation, .. }
            | ResilienceError::BothOperationsFailed { operation, .. } => operation,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_open_display() {
        let err = ResilienceError::CircuitOpen {
            operation: "detect.arcore".to_string(),
        };
        assert_eq!(err.to_string(), "circuit breaker is open for 'detect.arcore'");
        assert!(err.is_circuit_open());
        assert_eq!(err.operation(), "detect.arcore");
    }

    #[test]
    fn test_both_failed_names_operation() {
        let err = ResilienceError::BothOperationsFailed {
            operation: "session.start".to_string(),
            primary: "timeout".to_string(),
            fallback: "unavailable".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("session.start"));
        assert!(text.contains("timeout"));
        assert!(text.contains("unavailable"));
    }
}
