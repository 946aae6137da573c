//! Minimal configuration loading for mixgate.
//!
//! Both the engine and the `mixgate` binary import this crate, so it keeps
//! its dependencies small and knows nothing about devices or sessions beyond
//! where they live on disk.
//!
//! # Configuration Sections
//!
//! - **Paths** (`PathsConfig`): root directory and session directory.
//! - **Defaults** (`DefaultsConfig`): device id, detail tier and probe range
//!   used when a request does not name them.
//! - **Telemetry** (`TelemetryConfig`): log filter for the binary.
//!
//! # Usage
//!
//! ```rust,no_run
//! use mixconf::MixConfig;
//!
//! let config = MixConfig::load().expect("Failed to load config");
//! println!("sessions: {}", config.paths.session_dir().display());
//! println!("device: {}", config.defaults.device);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/mixgate/config.toml` (system)
//! 2. `~/.config/mixgate/config.toml` (user)
//! 3. `./mixgate.toml` (local override)
//! 4. Environment variables (`MIXGATE_*`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! root_dir = "~/.mixgate"
//! session_dir = "~/.mixgate/sessions"
//!
//! [defaults]
//! device = "hw:1"
//! tier = 1
//! max_cards = 8
//!
//! [telemetry]
//! log_level = "debug"
//! ```

pub mod defaults;
pub mod infra;
pub mod loader;

pub use defaults::DefaultsConfig;
pub use infra::{PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete mixgate configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MixConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl MixConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/mixgate/config.toml`
    /// 3. `~/.config/mixgate/config.toml`
    /// 4. `./mixgate.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./mixgate.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = MixConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# mixgate configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "root_dir = \"{}\"\n",
            self.paths.root_dir.display()
        ));
        output.push_str(&format!(
            "session_dir = \"{}\"\n",
            self.paths.session_dir().display()
        ));

        output.push_str("\n[defaults]\n");
        output.push_str(&format!("device = \"{}\"\n", self.defaults.device));
        output.push_str(&format!("tier = {}\n", self.defaults.tier));
        output.push_str(&format!("max_cards = {}\n", self.defaults.max_cards));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.telemetry.log_level
        ));

        output
    }

    /// Write the effective configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create config directory {}", parent.display())
                })?;
            }
        }
        std::fs::write(path, self.to_toml())
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = MixConfig::default();
        assert_eq!(config.defaults.device, "hw:0");
        assert_eq!(config.defaults.tier, 0);
        assert!(config.paths.session_dir().ends_with("sessions"));
    }

    #[test]
    fn test_to_toml() {
        let config = MixConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[defaults]"));
        assert!(toml.contains("[telemetry]"));
        assert!(toml.contains("device = \"hw:0\""));
    }

    #[test]
    fn test_save_round_trips_through_loader() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested/mixgate.toml");

        let mut config = MixConfig::default();
        config.paths.root_dir = PathBuf::from("/srv/mixgate");
        config.defaults.device = "hw:3".to_string();
        config.defaults.tier = 2;
        config.save(&path)?;

        let loaded = loader::load_from_file(&path)?;
        assert_eq!(loaded.paths.root_dir, PathBuf::from("/srv/mixgate"));
        assert_eq!(
            loaded.paths.session_dir(),
            PathBuf::from("/srv/mixgate/sessions")
        );
        assert_eq!(loaded.defaults.device, "hw:3");
        assert_eq!(loaded.defaults.tier, 2);
        Ok(())
    }
}
