//! Configuration file support.
//!
//! Settings live in an INI file, by default at
//! `<config dir>/bodyscan/config.ini`. Every key is optional:
//!
//! ```ini
//! [detection]
//! confidence_threshold = 0.7
//!
//! [monitor]
//! tick_interval_ms = 1000
//!
//! [alerts]
//! memory_high = 0.8
//! thermal_medium = fair
//!
//! [startup]
//! optimize_performance = true
//!
//! [logging]
//! level = info
//! log_dir = /var/log/bodyscan
//! ```
//!
//! Durations are written in milliseconds with an `_ms` suffix. Flags accept
//! `true/false`, `yes/no`, `on/off` and `1/0`.

mod error;
mod file;

pub use error::ConfigError;
pub use file::{config_file_path, ConfigFile};
