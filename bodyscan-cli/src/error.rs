//! CLI error type.

use std::fmt;

use bodyscan::calibration::CalibrationError;
use bodyscan::config::ConfigError;
use bodyscan::logging::LoggingError;
use bodyscan::startup::StartupError;
use bodyscan::system::MeasurementError;

#[derive(Debug)]
pub enum CliError {
    Config(String),
    Logging(LoggingError),
    Runtime(std::io::Error),
    Startup(StartupError),
    Calibration(CalibrationError),
    Measurement(MeasurementError),
    Output(serde_json::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Logging setup failed: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Startup(e) => write!(f, "Startup failed: {}", e),
            CliError::Calibration(e) => write!(f, "Calibration failed: {}", e),
            CliError::Measurement(e) => write!(f, "Measurement failed: {}", e),
            CliError::Output(e) => write!(f, "Failed to render output: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<StartupError> for CliError {
    fn from(e: StartupError) -> Self {
        CliError::Startup(e)
    }
}

impl From<CalibrationError> for CliError {
    fn from(e: CalibrationError) -> Self {
        CliError::Calibration(e)
    }
}

impl From<MeasurementError> for CliError {
    fn from(e: MeasurementError) -> Self {
        CliError::Measurement(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e)
    }
}

impl CliError {
    /// Print the error and exit with a non-zero status.
    pub fn exit(&self) -> ! {
        eprintln!("{} {}", console::style("Error:").red().bold(), self);
        std::process::exit(1);
    }
}
