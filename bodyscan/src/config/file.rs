//! INI configuration file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use super::error::ConfigError;
use crate::calibration::{CalibrationConfig, CalibrationError};
use crate::capability::CapabilityConfig;
use crate::detection::DetectionConfig;
use crate::logging::LoggingConfig;
use crate::performance::{AlertThresholds, MonitorConfig, OptimizerConfig, ThermalState, Tiers};
use crate::resilience::CircuitBreakerConfig;
use crate::startup::StartupConfig;
use crate::validation::{AccuracyConfig, PlausibleRange};

/// `<config dir>/bodyscan/config.ini`.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bodyscan").join("config.ini"))
}

/// Effective configuration for every subsystem.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub capability: CapabilityConfig,
    pub detection: DetectionConfig,
    pub validation: AccuracyConfig,
    pub calibration: CalibrationConfig,
    /// `[monitor]`, with thresholds from `[alerts]`.
    pub monitor: MonitorConfig,
    pub optimizer: OptimizerConfig,
    pub resilience: CircuitBreakerConfig,
    pub startup: StartupConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Load from `path`. Keys the file leaves out keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Load `path`, or the default location, falling back to defaults
    /// when the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path.map(Path::to_path_buf).or_else(config_file_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        Ok(())
    }

    pub fn to_ini_string(&self) -> Result<String, ConfigError> {
        let mut buf = Vec::new();
        self.to_ini().write_to(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let s = Section::new(ini, "capability");
        let d = &defaults.capability;
        let capability = CapabilityConfig {
            high_end_min_memory_gb: s.get("high_end_min_memory_gb", d.high_end_min_memory_gb)?,
            high_end_min_cores: s.get("high_end_min_cores", d.high_end_min_cores)?,
            mid_range_min_memory_gb: s.get("mid_range_min_memory_gb", d.mid_range_min_memory_gb)?,
            mid_range_min_cores: s.get("mid_range_min_cores", d.mid_range_min_cores)?,
            low_end_advanced_min_memory_gb: s
                .get("low_end_advanced_min_memory_gb", d.low_end_advanced_min_memory_gb)?,
            high_end_frame_interval: s
                .millis("high_end_frame_interval_ms", d.high_end_frame_interval)?,
            mid_range_frame_interval: s
                .millis("mid_range_frame_interval_ms", d.mid_range_frame_interval)?,
            low_end_frame_interval: s
                .millis("low_end_frame_interval_ms", d.low_end_frame_interval)?,
            frame_history_size: s.get("frame_history_size", d.frame_history_size)?,
        };

        let s = Section::new(ini, "detection");
        let d = &defaults.detection;
        let detection = DetectionConfig {
            confidence_threshold: s.get("confidence_threshold", d.confidence_threshold)?,
            history_size: s.get("history_size", d.history_size)?,
        };

        let s = Section::new(ini, "validation");
        let d = &defaults.validation;
        let validation = AccuracyConfig {
            enable_temporal_smoothing: s.flag("temporal_smoothing", d.enable_temporal_smoothing)?,
            enable_outlier_detection: s.flag("outlier_detection", d.enable_outlier_detection)?,
            enable_proportional_validation: s
                .flag("proportional_validation", d.enable_proportional_validation)?,
            smoothing_window: s.get("smoothing_window", d.smoothing_window)?,
            outlier_threshold: s.get("outlier_threshold", d.outlier_threshold)?,
            min_confidence_threshold: s.get("min_confidence", d.min_confidence_threshold)?,
            shoulder_width_range: PlausibleRange::new(
                s.get("shoulder_width_min", d.shoulder_width_range.min)?,
                s.get("shoulder_width_max", d.shoulder_width_range.max)?,
            ),
            height_range: PlausibleRange::new(
                s.get("height_min", d.height_range.min)?,
                s.get("height_max", d.height_range.max)?,
            ),
            expected_ratio: s.get("expected_ratio", d.expected_ratio)?,
            ratio_tolerance: s.get("ratio_tolerance", d.ratio_tolerance)?,
            history_size: s.get("history_size", d.history_size)?,
        };

        let s = Section::new(ini, "calibration");
        let d = &defaults.calibration;
        let mut learning = d.learning.clone();
        learning.adaptation_rate = s.get("adaptation_rate", learning.adaptation_rate)?;
        learning.feedback_weight = s.get("feedback_weight", learning.feedback_weight)?;
        learning.learning_enabled = s.flag("learning_enabled", learning.learning_enabled)?;
        let calibration = CalibrationConfig {
            steps: d.steps.clone(),
            min_profile_samples: s.get("min_profile_samples", d.min_profile_samples)?,
            min_scale: s.get("min_scale", d.min_scale)?,
            max_scale: s.get("max_scale", d.max_scale)?,
            accuracy_history_size: s.get("accuracy_history_size", d.accuracy_history_size)?,
            accuracy_window: s.get("accuracy_window", d.accuracy_window)?,
            learning,
            finished_session_history: s
                .get("finished_session_history", d.finished_session_history)?,
        };
        calibration.validate().map_err(|e| match e {
            CalibrationError::InvalidConfig { key, value, .. } => {
                ConfigError::invalid("calibration", key, &value)
            }
            other => ConfigError::Parse(other.to_string()),
        })?;

        let s = Section::new(ini, "alerts");
        let d = &defaults.monitor.thresholds;
        let thresholds = AlertThresholds {
            frame_rate: s.tiers("frame_rate", d.frame_rate)?,
            memory: s.tiers("memory", d.memory)?,
            cpu: s.tiers("cpu", d.cpu)?,
            battery: s.tiers("battery", d.battery)?,
            thermal_medium: s.parse_with("thermal_medium", d.thermal_medium, parse_thermal)?,
        };

        let s = Section::new(ini, "monitor");
        let d = &defaults.monitor;
        let monitor = MonitorConfig {
            tick_interval: s.millis("tick_interval_ms", d.tick_interval)?,
            history_size: s.get("history_size", d.history_size)?,
            alert_history_size: s.get("alert_history_size", d.alert_history_size)?,
            active_alert_window: s.millis("active_alert_window_ms", d.active_alert_window)?,
            thresholds,
        };

        let s = Section::new(ini, "optimizer");
        let d = &defaults.optimizer;
        let optimizer = OptimizerConfig {
            target_frame_rate: s.get("target_frame_rate", d.target_frame_rate)?,
            max_memory_mb: s.get("max_memory_mb", d.max_memory_mb)?,
            battery_threshold_percent: s
                .get("battery_threshold_percent", d.battery_threshold_percent)?,
            history_size: s.get("history_size", d.history_size)?,
            enable_adaptive_quality: s.flag("adaptive_quality", d.enable_adaptive_quality)?,
            enable_dynamic_frame_rate: s.flag("dynamic_frame_rate", d.enable_dynamic_frame_rate)?,
            enable_memory_optimization: s
                .flag("memory_optimization", d.enable_memory_optimization)?,
            enable_battery_optimization: s
                .flag("battery_optimization", d.enable_battery_optimization)?,
            enable_thermal_management: s.flag("thermal_management", d.enable_thermal_management)?,
            enable_predictive_optimization: s
                .flag("predictive_optimization", d.enable_predictive_optimization)?,
        };

        let s = Section::new(ini, "resilience");
        let d = &defaults.resilience;
        let resilience = CircuitBreakerConfig {
            failure_threshold: s.get("failure_threshold", d.failure_threshold)?,
            timeout: s.millis("timeout_ms", d.timeout)?,
            reset_timeout: s.millis("reset_timeout_ms", d.reset_timeout)?,
        };

        let s = Section::new(ini, "startup");
        let d = &defaults.startup;
        let startup = StartupConfig {
            preserve_accuracy: s.flag("preserve_accuracy", d.preserve_accuracy)?,
            enable_advanced_features: s
                .flag("enable_advanced_features", d.enable_advanced_features)?,
            maintain_calibration: s.flag("maintain_calibration", d.maintain_calibration)?,
            optimize_performance: s.flag("optimize_performance", d.optimize_performance)?,
        };

        let s = Section::new(ini, "logging");
        let d = &defaults.logging;
        let logging = LoggingConfig {
            level: s.raw("level").map(str::to_string).unwrap_or_else(|| d.level.clone()),
            log_dir: s.path("log_dir").or_else(|| d.log_dir.clone()),
            file_prefix: s
                .raw("file_prefix")
                .map(str::to_string)
                .unwrap_or_else(|| d.file_prefix.clone()),
            ansi: s.flag("ansi", d.ansi)?,
            chrome_trace: s.path("chrome_trace").or_else(|| d.chrome_trace.clone()),
        };

        Ok(Self {
            capability,
            detection,
            validation,
            calibration,
            monitor,
            optimizer,
            resilience,
            startup,
            logging,
        })
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();

        let c = &self.capability;
        ini.with_section(Some("capability"))
            .set("high_end_min_memory_gb", c.high_end_min_memory_gb.to_string())
            .set("high_end_min_cores", c.high_end_min_cores.to_string())
            .set("mid_range_min_memory_gb", c.mid_range_min_memory_gb.to_string())
            .set("mid_range_min_cores", c.mid_range_min_cores.to_string())
            .set("low_end_advanced_min_memory_gb", c.low_end_advanced_min_memory_gb.to_string())
            .set("high_end_frame_interval_ms", ms(c.high_end_frame_interval))
            .set("mid_range_frame_interval_ms", ms(c.mid_range_frame_interval))
            .set("low_end_frame_interval_ms", ms(c.low_end_frame_interval))
            .set("frame_history_size", c.frame_history_size.to_string());

        let d = &self.detection;
        ini.with_section(Some("detection"))
            .set("confidence_threshold", d.confidence_threshold.to_string())
            .set("history_size", d.history_size.to_string());

        let v = &self.validation;
        ini.with_section(Some("validation"))
            .set("temporal_smoothing", v.enable_temporal_smoothing.to_string())
            .set("outlier_detection", v.enable_outlier_detection.to_string())
            .set("proportional_validation", v.enable_proportional_validation.to_string())
            .set("smoothing_window", v.smoothing_window.to_string())
            .set("outlier_threshold", v.outlier_threshold.to_string())
            .set("min_confidence", v.min_confidence_threshold.to_string())
            .set("shoulder_width_min", v.shoulder_width_range.min.to_string())
            .set("shoulder_width_max", v.shoulder_width_range.max.to_string())
            .set("height_min", v.height_range.min.to_string())
            .set("height_max", v.height_range.max.to_string())
            .set("expected_ratio", v.expected_ratio.to_string())
            .set("ratio_tolerance", v.ratio_tolerance.to_string())
            .set("history_size", v.history_size.to_string());

        let c = &self.calibration;
        ini.with_section(Some("calibration"))
            .set("min_profile_samples", c.min_profile_samples.to_string())
            .set("min_scale", c.min_scale.to_string())
            .set("max_scale", c.max_scale.to_string())
            .set("accuracy_history_size", c.accuracy_history_size.to_string())
            .set("accuracy_window", c.accuracy_window.to_string())
            .set("finished_session_history", c.finished_session_history.to_string())
            .set("adaptation_rate", c.learning.adaptation_rate.to_string())
            .set("feedback_weight", c.learning.feedback_weight.to_string())
            .set("learning_enabled", c.learning.learning_enabled.to_string());

        let m = &self.monitor;
        ini.with_section(Some("monitor"))
            .set("tick_interval_ms", ms(m.tick_interval))
            .set("history_size", m.history_size.to_string())
            .set("alert_history_size", m.alert_history_size.to_string())
            .set("active_alert_window_ms", ms(m.active_alert_window));

        let t = &m.thresholds;
        let mut alerts = ini.with_section(Some("alerts"));
        for (name, tiers) in [
            ("frame_rate", t.frame_rate),
            ("memory", t.memory),
            ("cpu", t.cpu),
            ("battery", t.battery),
        ] {
            alerts
                .set(format!("{name}_medium"), tiers.medium.to_string())
                .set(format!("{name}_high"), tiers.high.to_string())
                .set(format!("{name}_critical"), tiers.critical.to_string());
        }
        alerts.set("thermal_medium", t.thermal_medium.as_str());

        let o = &self.optimizer;
        ini.with_section(Some("optimizer"))
            .set("target_frame_rate", o.target_frame_rate.to_string())
            .set("max_memory_mb", o.max_memory_mb.to_string())
            .set("battery_threshold_percent", o.battery_threshold_percent.to_string())
            .set("history_size", o.history_size.to_string())
            .set("adaptive_quality", o.enable_adaptive_quality.to_string())
            .set("dynamic_frame_rate", o.enable_dynamic_frame_rate.to_string())
            .set("memory_optimization", o.enable_memory_optimization.to_string())
            .set("battery_optimization", o.enable_battery_optimization.to_string())
            .set("thermal_management", o.enable_thermal_management.to_string())
            .set("predictive_optimization", o.enable_predictive_optimization.to_string());

        let r = &self.resilience;
        ini.with_section(Some("resilience"))
            .set("failure_threshold", r.failure_threshold.to_string())
            .set("timeout_ms", ms(r.timeout))
            .set("reset_timeout_ms", ms(r.reset_timeout));

        let s = &self.startup;
        ini.with_section(Some("startup"))
            .set("preserve_accuracy", s.preserve_accuracy.to_string())
            .set("enable_advanced_features", s.enable_advanced_features.to_string())
            .set("maintain_calibration", s.maintain_calibration.to_string())
            .set("optimize_performance", s.optimize_performance.to_string());

        let l = &self.logging;
        let mut logging = ini.with_section(Some("logging"));
        logging
            .set("level", l.level.as_str())
            .set("file_prefix", l.file_prefix.as_str())
            .set("ansi", l.ansi.to_string());
        if let Some(dir) = &l.log_dir {
            logging.set("log_dir", dir.display().to_string());
        }
        if let Some(trace) = &l.chrome_trace {
            logging.set("chrome_trace", trace.display().to_string());
        }

        ini
    }
}

fn ms(duration: Duration) -> String {
    duration.as_millis().to_string()
}

fn parse_thermal(value: &str) -> Option<ThermalState> {
    match value.to_ascii_lowercase().as_str() {
        "normal" => Some(ThermalState::Normal),
        "fair" => Some(ThermalState::Fair),
        "serious" => Some(ThermalState::Serious),
        "critical" => Some(ThermalState::Critical),
        _ => None,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Typed reads from one INI section.
struct Section<'a> {
    ini: &'a Ini,
    name: &'static str,
}

impl<'a> Section<'a> {
    fn new(ini: &'a Ini, name: &'static str) -> Self {
        Self { ini, name }
    }

    fn raw(&self, key: &str) -> Option<&'a str> {
        self.ini
            .section(Some(self.name))
            .and_then(|props| props.get(key))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn parse_with<T>(&self, key: &str, default: T, parse: impl Fn(&str) -> Option<T>) -> Result<T, ConfigError> {
        match self.raw(key) {
            Some(value) => parse(value).ok_or_else(|| ConfigError::invalid(self.name, key, value)),
            None => Ok(default),
        }
    }

    fn get<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        self.parse_with(key, default, |v| v.parse().ok())
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        self.parse_with(key, default, parse_flag)
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse_with(key, default, |v| v.parse().ok().map(Duration::from_millis))
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.raw(key).map(PathBuf::from)
    }

    fn tiers(&self, prefix: &str, default: Tiers) -> Result<Tiers, ConfigError> {
        Ok(Tiers::new(
            self.get(&format!("{prefix}_medium"), default.medium)?,
            self.get(&format!("{prefix}_high"), default.high)?,
            self.get(&format!("{prefix}_critical"), default.critical)?,
        ))
    }
}
