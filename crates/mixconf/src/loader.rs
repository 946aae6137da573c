//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, DefaultsConfig, MixConfig, PathsConfig, TelemetryConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Highest detail tier accepted from config or environment.
const MAX_TIER: u8 = 3;

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/mixgate/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("mixgate/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("mixgate.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<MixConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from TOML string.
fn parse_toml(contents: &str, path: &Path) -> Result<MixConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut config = MixConfig::default();

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("root_dir").and_then(|v| v.as_str()) {
            config.paths.root_dir = expand_path(v);
        }
        if let Some(v) = paths.get("session_dir").and_then(|v| v.as_str()) {
            config.paths.session_dir = Some(expand_path(v));
        }
    }

    if let Some(defaults) = table.get("defaults").and_then(|v| v.as_table()) {
        if let Some(v) = defaults.get("device").and_then(|v| v.as_str()) {
            config.defaults.device = v.to_string();
        }
        if let Some(v) = defaults.get("tier").and_then(|v| v.as_integer()) {
            config.defaults.tier = v.clamp(0, MAX_TIER as i64) as u8;
        }
        if let Some(v) = defaults.get("max_cards").and_then(|v| v.as_integer()) {
            if v > 0 {
                config.defaults.max_cards = v as u32;
            } else {
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    message: format!("defaults.max_cards must be positive, got {v}"),
                });
            }
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(config)
}

/// Merge two configs, with `overlay` taking precedence wherever it differs
/// from the compiled defaults.
pub fn merge_configs(base: MixConfig, overlay: MixConfig) -> MixConfig {
    let default_paths = PathsConfig::default();
    let default_defaults = DefaultsConfig::default();
    let default_telemetry = TelemetryConfig::default();

    MixConfig {
        paths: PathsConfig {
            root_dir: if overlay.paths.root_dir != default_paths.root_dir {
                overlay.paths.root_dir
            } else {
                base.paths.root_dir
            },
            session_dir: overlay.paths.session_dir.or(base.paths.session_dir),
        },
        defaults: DefaultsConfig {
            device: if overlay.defaults.device != default_defaults.device {
                overlay.defaults.device
            } else {
                base.defaults.device
            },
            tier: if overlay.defaults.tier != default_defaults.tier {
                overlay.defaults.tier
            } else {
                base.defaults.tier
            },
            max_cards: if overlay.defaults.max_cards != default_defaults.max_cards {
                overlay.defaults.max_cards
            } else {
                base.defaults.max_cards
            },
        },
        telemetry: TelemetryConfig {
            log_level: if overlay.telemetry.log_level != default_telemetry.log_level {
                overlay.telemetry.log_level
            } else {
                base.telemetry.log_level
            },
        },
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut MixConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

fn apply_overrides_from<F>(config: &mut MixConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("MIXGATE_ROOT_DIR") {
        config.paths.root_dir = expand_path(&v);
        sources.env_overrides.push("MIXGATE_ROOT_DIR".to_string());
    }
    if let Some(v) = lookup("MIXGATE_SESSION_DIR") {
        config.paths.session_dir = Some(expand_path(&v));
        sources.env_overrides.push("MIXGATE_SESSION_DIR".to_string());
    }

    if let Some(v) = lookup("MIXGATE_DEVICE") {
        config.defaults.device = v;
        sources.env_overrides.push("MIXGATE_DEVICE".to_string());
    }
    if let Some(v) = lookup("MIXGATE_TIER") {
        if let Ok(tier) = v.parse::<u8>() {
            config.defaults.tier = tier.min(MAX_TIER);
            sources.env_overrides.push("MIXGATE_TIER".to_string());
        }
    }

    if let Some(v) = lookup("MIXGATE_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("MIXGATE_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_discover_config_files() {
        let _files = discover_config_files();
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
[paths]
root_dir = "/custom/root"
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.paths.root_dir, PathBuf::from("/custom/root"));
        assert_eq!(config.paths.session_dir(), PathBuf::from("/custom/root/sessions"));
        assert_eq!(config.defaults.device, "hw:0");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[paths]
root_dir = "/data/mixgate"
session_dir = "/data/snapshots"

[defaults]
device = "hw:2"
tier = 7
max_cards = 4

[telemetry]
log_level = "debug"
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();

        assert_eq!(config.paths.root_dir, PathBuf::from("/data/mixgate"));
        assert_eq!(config.paths.session_dir(), PathBuf::from("/data/snapshots"));
        assert_eq!(config.defaults.device, "hw:2");
        assert_eq!(config.defaults.tier, 3, "tier is clamped to the minimal tier");
        assert_eq!(config.defaults.max_cards, 4);
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_parse_rejects_zero_max_cards() {
        let toml = "[defaults]\nmax_cards = 0\n";
        let err = parse_toml(toml, Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = parse_toml("[paths\nroot_dir = 1", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_merge_prefers_overlay_changes() {
        let mut base = MixConfig::default();
        base.defaults.device = "hw:1".to_string();
        base.telemetry.log_level = "warn".to_string();

        let mut overlay = MixConfig::default();
        overlay.defaults.tier = 2;

        let merged = merge_configs(base, overlay);
        assert_eq!(merged.defaults.device, "hw:1");
        assert_eq!(merged.defaults.tier, 2);
        assert_eq!(merged.telemetry.log_level, "warn");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MIXGATE_SESSION_DIR", "/tmp/mixgate-sessions"),
            ("MIXGATE_DEVICE", "hw:5"),
            ("MIXGATE_TIER", "1"),
            ("MIXGATE_LOG_LEVEL", "trace"),
        ]
        .into_iter()
        .collect();

        let mut config = MixConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| {
            vars.get(k).map(|v| v.to_string())
        });

        assert_eq!(config.paths.session_dir(), PathBuf::from("/tmp/mixgate-sessions"));
        assert_eq!(config.defaults.device, "hw:5");
        assert_eq!(config.defaults.tier, 1);
        assert_eq!(config.telemetry.log_level, "trace");
        assert_eq!(sources.env_overrides.len(), 4);
    }

    #[test]
    fn test_env_override_ignores_bad_tier() {
        let mut config = MixConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| {
            (k == "MIXGATE_TIER").then(|| "loud".to_string())
        });
        assert_eq!(config.defaults.tier, 0);
        assert!(sources.env_overrides.is_empty());
    }
}
