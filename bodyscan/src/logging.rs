//! Tracing subscriber setup.
//!
//! ```text
//! registry
//!   ├── EnvFilter        RUST_LOG, else LoggingConfig::level
//!   ├── console layer    local-time timestamps
//!   ├── file layer       daily rolling, non-blocking (optional)
//!   └── chrome layer     `profiling` feature only (optional)
//! ```

use std::path::PathBuf;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for daily log files. `None` logs to the console only.
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
    pub ansi: bool,
    /// Trace file written by the chrome layer when built with `profiling`.
    pub chrome_trace: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            file_prefix: "bodyscan.log".to_string(),
            ansi: true,
            chrome_trace: None,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

/// Default directory for log files.
pub fn default_log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("bodyscan").join("logs"))
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },

    #[error("failed to create log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Keeps background writers alive. Drop it only at process exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
    #[cfg(feature = "profiling")]
    _chrome: Option<tracing_chrome::FlushGuard>,
}

fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidFilter {
        directive: level.to_string(),
        message: e.to_string(),
    })
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.level)?,
    };

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(offset, Rfc3339);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer.clone())
        .with_ansi(config.ansi)
        .with_target(true);

    let (file_layer, file_guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer);

    #[cfg(feature = "profiling")]
    let (registry, chrome_guard) = {
        let (layer, guard) = match &config.chrome_trace {
            Some(path) => {
                let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
                    .file(path)
                    .include_args(true)
                    .build();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };
        (registry.with(layer), guard)
    };

    registry
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    tracing::debug!(
        level = %config.level,
        file_logging = config.log_dir.is_some(),
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _file: file_guard,
        #[cfg(feature = "profiling")]
        _chrome: chrome_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_logs_to_console() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_builders() {
        let config = LoggingConfig::default()
            .with_level("bodyscan=debug")
            .with_log_dir("/tmp/logs");
        assert_eq!(config.level, "bodyscan=debug");
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/logs")));
    }

    #[test]
    fn test_build_filter_accepts_directives() {
        assert!(build_filter("info").is_ok());
        assert!(build_filter("bodyscan=debug,warn").is_ok());
    }

    #[test]
    fn test_build_filter_rejects_garbage() {
        let err = build_filter("bodyscan=verbose").unwrap_err();
        assert!(matches!(err, LoggingError::InvalidFilter { .. }));
    }
}
