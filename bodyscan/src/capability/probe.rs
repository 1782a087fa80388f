//! Hardware probes.
//!
//! The profiler never talks to the platform directly: it asks a
//! [`DeviceProbe`] for raw facts. [`SystemProbe`] reads the host, while
//! [`StaticProbe`] reports fixed values for tests and CLI overrides.

use std::path::PathBuf;
use thiserror::Error;

use super::types::HardwareInfo;

/// Errors raised while probing the device.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// A platform source could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A platform source was readable but did not contain the expected data.
    #[error("unrecognised hardware report: {0}")]
    Unrecognised(String),
}

/// Source of raw hardware facts.
pub trait DeviceProbe: Send + Sync {
    fn probe(&self) -> Result<HardwareInfo, ProbeError>;
}

/// Probe that always reports the same hardware.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe {
    info: HardwareInfo,
}

impl StaticProbe {
    pub fn new(memory_gb: f64, processor_cores: u32) -> Self {
        Self {
            info: HardwareInfo {
                memory_gb,
                processor_cores,
            },
        }
    }
}

impl DeviceProbe for StaticProbe {
    fn probe(&self) -> Result<HardwareInfo, ProbeError> {
        Ok(self.info)
    }
}

/// Probe for the running host.
///
/// Core count comes from [`std::thread::available_parallelism`]; memory is
/// read from `/proc/meminfo` (`MemTotal`, in kB).
#[derive(Debug, Clone)]
pub struct SystemProbe {
    meminfo_path: PathBuf,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            meminfo_path: PathBuf::from("/proc/meminfo"),
        }
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read memory information from a different file (used by tests).
    pub fn with_meminfo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.meminfo_path = path.into();
        self
    }

    fn memory_gb(&self) -> Result<f64, ProbeError> {
        let contents =
            std::fs::read_to_string(&self.meminfo_path).map_err(|source| ProbeError::Io {
                path: self.meminfo_path.clone(),
                source,
            })?;
        parse_mem_total_gb(&contents)
    }
}

impl DeviceProbe for SystemProbe {
    fn probe(&self) -> Result<HardwareInfo, ProbeError> {
        let processor_cores = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .map_err(|e| ProbeError::Unrecognised(format!("core count unavailable: {e}")))?;
        Ok(HardwareInfo {
            memory_gb: self.memory_gb()?,
            processor_cores,
        })
    }
}

/// Extract `MemTotal` from meminfo text and convert it to gigabytes.
fn parse_mem_total_gb(contents: &str) -> Result<f64, ProbeError> {
    let line = contents
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .ok_or_else(|| ProbeError::Unrecognised("MemTotal missing".to_string()))?;

    let kb: f64 = line
        .split_whitespace()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ProbeError::Unrecognised(format!("bad MemTotal line: {line}")))?;

    Ok(kb / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_static_probe() {
        let info = StaticProbe::new(8.0, 8).probe().unwrap();
        assert_eq!(info.memory_gb, 8.0);
        assert_eq!(info.processor_cores, 8);
    }

    #[test]
    fn test_parse_mem_total() {
        let text = "MemTotal:        8388608 kB\nMemFree:         1024 kB\n";
        let gb = parse_mem_total_gb(text).unwrap();
        assert!((gb - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_mem_total_missing() {
        let err = parse_mem_total_gb("MemFree: 1 kB").unwrap_err();
        assert!(err.to_string().contains("MemTotal missing"));
    }

    #[test]
    fn test_system_probe_reads_custom_meminfo() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MemTotal:        4194304 kB").unwrap();

        let probe = SystemProbe::new().with_meminfo_path(file.path());
        let info = probe.probe().unwrap();
        assert!((info.memory_gb - 4.0).abs() < 1e-9);
        assert!(info.processor_cores >= 1);
    }

    #[test]
    fn test_system_probe_missing_file_is_io_error() {
        let probe = SystemProbe::new().with_meminfo_path("/nonexistent/meminfo");
        assert!(matches!(probe.probe(), Err(ProbeError::Io { .. })));
    }
}
