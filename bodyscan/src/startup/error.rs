//! Startup error types.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StartupError {
    /// Initialization failed part way, but measurement accuracy held.
    #[error("initialization degraded: {}", .warnings.join("; "))]
    InitializationDegraded { warnings: Vec<String> },

    /// Initialization failed and minimal measurement capability is gone.
    #[error("measurement accuracy lost: {}", .warnings.join("; "))]
    AccuracyLost { warnings: Vec<String> },

    /// A core module failed to initialize.
    #[error("module '{module}' failed: {message}")]
    ModuleFailed { module: String, message: String },
}

impl StartupError {
    pub fn module_failed(module: impl Into<String>, message: impl Into<String>) -> Self {
        StartupError::ModuleFailed {
            module: module.into(),
            message: message.into(),
        }
    }
}
