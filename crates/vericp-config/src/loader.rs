//! Configuration loader utilities

use crate::{Config, ConfigBuilder, ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "VERICP";

/// Configuration loader with common loading patterns
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the first file found in the default locations,
    /// then apply environment overrides
    pub fn load_default() -> ConfigResult<Config> {
        let mut builder = ConfigBuilder::new().add_defaults();

        if let Some(path) = Self::config_exists() {
            builder = builder.add_source_file(path);
        }

        builder.add_env_prefix(ENV_PREFIX).build()
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Configuration file not found",
                ),
            });
        }

        ConfigBuilder::new()
            .add_defaults()
            .add_source_file(path)
            .add_env_prefix(ENV_PREFIX)
            .build()
    }

    /// Render a configuration in the format implied by `path`'s extension
    pub fn render(config: &Config, path: &Path) -> ConfigResult<String> {
        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::to_string_pretty(config)?,
            Some("json") => serde_json::to_string_pretty(config)?,
            _ => serde_yaml::to_string(config)?,
        };
        Ok(content)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(config: &Config, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = Self::render(config, path)?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Generate a default configuration file
    pub fn generate_default_config<P: AsRef<Path>>(path: P) -> ConfigResult<()> {
        Self::save_to_file(&Config::default(), path)
    }

    /// Get default configuration file paths in order of preference
    pub fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("vericp.yaml"),
            PathBuf::from("vericp.yml"),
            PathBuf::from("vericp.toml"),
            PathBuf::from("vericp.json"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            let vericp_dir = config_dir.join("vericp");
            paths.push(vericp_dir.join("config.yaml"));
            paths.push(vericp_dir.join("config.yml"));
            paths.push(vericp_dir.join("config.toml"));
            paths.push(vericp_dir.join("config.json"));
        }

        paths
    }

    /// First configuration file that exists in the default locations
    pub fn config_exists() -> Option<PathBuf> {
        Self::default_config_paths()
            .into_iter()
            .find(|path| path.exists())
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME").ok().map(|home| {
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
            })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|home| PathBuf::from(home).join(".config"))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VerificationConfig;
    use rstest::rstest;
    use tempfile::TempDir;
    use vericp_types::{DigestPreference, VerifyPolicy};

    #[rstest]
    #[case("config.yaml")]
    #[case("config.toml")]
    #[case("config.json")]
    fn test_save_and_load(#[case] name: &str) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(name);

        let mut original = Config::default();
        original.verification =
            VerificationConfig::from_policy(VerifyPolicy::VerifyBelowThreshold(1 << 20), DigestPreference::Sha256);
        original.thresholds.direct_staged_threshold = Some(1 << 30);
        ConfigLoader::save_to_file(&original, &config_path).unwrap();

        let loaded = ConfigLoader::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigLoader::load_from_file(temp_dir.path().join("nope.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_default_paths_start_in_working_dir() {
        let paths = ConfigLoader::default_config_paths();
        assert_eq!(paths[0], PathBuf::from("vericp.yaml"));
        assert!(paths.len() >= 4);
    }
}
