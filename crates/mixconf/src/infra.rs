//! Infrastructure configuration - filesystem locations and logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths for mixgate state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Base directory for mixgate data.
    /// Default: ~/.mixgate
    #[serde(default = "PathsConfig::default_root_dir")]
    pub root_dir: PathBuf,

    /// Directory holding one sub-directory of session files per device.
    /// Default: `<root_dir>/sessions`
    #[serde(default)]
    pub session_dir: Option<PathBuf>,
}

impl PathsConfig {
    pub(crate) fn default_root_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".mixgate"))
            .unwrap_or_else(|| PathBuf::from(".mixgate"))
    }

    /// Effective session directory.
    pub fn session_dir(&self) -> PathBuf {
        self.session_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join("sessions"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root_dir: Self::default_root_dir(),
            session_dir: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    pub(crate) fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
