//! Configuration builder for layered configuration loading

use crate::{Config, ConfigError, ConfigResult};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

/// Configuration builder for loading configuration from multiple sources
#[derive(Debug)]
pub struct ConfigBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<ConfigSource>,
    env_separator: String,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File { path: PathBuf, format: FileFormat },
    Defaults,
    Environment { prefix: String },
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
            env_separator: "__".to_string(),
        }
    }

    /// Add default configuration values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source. Missing files are skipped.
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add a configuration file source with explicit format
    pub fn add_source_file_with_format<P: AsRef<Path>>(
        mut self,
        path: P,
        format: FileFormat,
    ) -> Self {
        let path = path.as_ref().to_path_buf();
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = separator.into();
        self
    }

    /// Build and validate the configuration
    pub fn build(mut self) -> ConfigResult<Config> {
        // Defaults are always the base layer
        self.inner = self
            .inner
            .add_source(config::Config::try_from(&Config::default())?);

        for source in &self.sources {
            match source {
                ConfigSource::File { path, format } => {
                    if path.exists() {
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                ConfigSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix)
                            .prefix_separator(&self.env_separator)
                            .separator(&self.env_separator)
                            .try_parsing(true),
                    );
                }
                ConfigSource::Defaults => {
                    // Already handled above
                }
            }
        }

        let config = self.inner.build()?;
        let result: Config = config.try_deserialize()?;

        Self::validate(&result)?;

        Ok(result)
    }

    /// Detect file format from extension
    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    /// Validate cross-field constraints the types cannot express
    fn validate(config: &Config) -> ConfigResult<()> {
        let thresholds = &config.thresholds;
        if thresholds.direct_large_threshold == 0 {
            return Err(ConfigError::validation(
                "thresholds.direct_large_threshold must be greater than 0",
            ));
        }
        if thresholds.max_file_size == 0 {
            return Err(ConfigError::validation(
                "thresholds.max_file_size must be greater than 0",
            ));
        }

        config.verification.verify_policy()?;

        if config.progress.poll_interval_ms == 0 || config.progress.poll_interval_ms > 10_000 {
            return Err(ConfigError::validation(
                "progress.poll_interval_ms must be between 1 and 10000",
            ));
        }
        if config.progress.channel_capacity == 0 {
            return Err(ConfigError::validation(
                "progress.channel_capacity must be greater than 0",
            ));
        }

        if config.batch.max_concurrent_files == 0 {
            return Err(ConfigError::validation(
                "batch.max_concurrent_files must be greater than 0",
            ));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&config.logging.level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PolicyMode;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};
    use vericp_types::VerifyPolicy;

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().add_defaults().build().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_builder_yaml_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
thresholds:
  direct_large_enabled: false
  direct_staged_threshold: 1048576
io:
  window_size: 131072
verification:
  policy: verify_below_threshold
  threshold: 4096
  algorithm: sha256
"#
        )
        .unwrap();

        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(temp_file.path())
            .build()
            .unwrap();

        assert!(!config.thresholds.direct_large_enabled);
        assert_eq!(config.thresholds.direct_staged_threshold, Some(1_048_576));
        assert_eq!(config.io.window_size.get(), 131_072);
        assert_eq!(
            config.verification.verify_policy().unwrap(),
            VerifyPolicy::VerifyBelowThreshold(4096)
        );
        assert_eq!(config.io.flush_every_windows, 8);
    }

    #[test]
    fn test_builder_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vericp.toml");
        std::fs::write(
            &path,
            "[verification]\npolicy = \"skip_all\"\n\n[safety]\nfree_space_margin = 0\n",
        )
        .unwrap();

        let config = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(&path)
            .build()
            .unwrap();

        assert_eq!(config.verification.policy, PolicyMode::SkipAll);
        assert_eq!(config.safety.free_space_margin, 0);
    }

    #[test]
    fn test_builder_env_override() {
        std::env::set_var("VERICP_BUILDER_TEST__IO__FLUSH_EVERY_WINDOWS", "3");
        let config = ConfigBuilder::new()
            .add_defaults()
            .add_env_prefix("VERICP_BUILDER_TEST")
            .build()
            .unwrap();
        std::env::remove_var("VERICP_BUILDER_TEST__IO__FLUSH_EVERY_WINDOWS");

        assert_eq!(config.io.flush_every_windows, 3);
    }

    #[test]
    fn test_builder_validation() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
verification:
  policy: verify_below_threshold
"#
        )
        .unwrap();

        let result = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(temp_file.path())
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("verification.threshold"));
    }

    #[test]
    fn test_builder_rejects_unaligned_window() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "io:\n  window_size: 100000").unwrap();

        let result = ConfigBuilder::new()
            .add_defaults()
            .add_source_file(temp_file.path())
            .build();
        assert!(result.is_err());
    }
}
