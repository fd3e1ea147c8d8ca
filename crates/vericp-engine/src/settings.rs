//! Immutable engine settings
//!
//! Built once from the loaded [`Config`] and shared by reference; nothing in
//! the engine reads configuration from anywhere else.

use std::time::Duration;
use vericp_config::Config;
use vericp_types::{BufferSize, DigestPreference, Result, VerifyPolicy, WindowSize};

/// Inputs of the strategy selector besides the endpoint classes and length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyThresholds {
    /// Allow DIRECT_LARGE
    pub direct_large_enabled: bool,
    /// Minimum length for DIRECT_LARGE
    pub direct_large_threshold: u64,
    /// Files at least this large skip DIRECT_SMALL (`None` = no limit)
    pub direct_staged_threshold: Option<u64>,
}

impl Default for StrategyThresholds {
    fn default() -> Self {
        Self {
            direct_large_enabled: true,
            direct_large_threshold: 1024 * 1024 * 1024,
            direct_staged_threshold: None,
        }
    }
}

/// Read-only settings shared by every copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Strategy selection thresholds
    pub thresholds: StrategyThresholds,
    /// Hard upper bound on the source length
    pub max_file_size: u64,
    /// Window size for the DIRECT engines
    pub window_size: WindowSize,
    /// Chunk size for the STAGED engine and buffered fallbacks
    pub chunk_size: BufferSize,
    /// DIRECT_LARGE flush cadence in windows (0 = only at the end)
    pub flush_every_windows: u32,
    /// Verification policy
    pub policy: VerifyPolicy,
    /// Digest preference
    pub digest: DigestPreference,
    /// Bytes that must stay free on the destination volume
    pub free_space_margin: u64,
    /// Progress channel drain interval
    pub progress_poll_interval: Duration,
    /// Progress channel capacity
    pub progress_capacity: usize,
    /// Files copied concurrently by a batch
    pub max_concurrent_files: usize,
}

impl EngineSettings {
    /// Convert a loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            thresholds: StrategyThresholds {
                direct_large_enabled: config.thresholds.direct_large_enabled,
                direct_large_threshold: config.thresholds.direct_large_threshold,
                direct_staged_threshold: config.thresholds.direct_staged_threshold,
            },
            max_file_size: config.thresholds.max_file_size,
            window_size: config.io.window_size,
            chunk_size: config.io.chunk_size,
            flush_every_windows: config.io.flush_every_windows,
            policy: config.verification.verify_policy()?,
            digest: config.verification.algorithm,
            free_space_margin: config.safety.free_space_margin,
            progress_poll_interval: config.progress.poll_interval(),
            progress_capacity: config.progress.channel_capacity,
            max_concurrent_files: config.batch.max_concurrent_files.max(1),
        })
    }

    /// Replace the verification policy
    pub fn with_policy(mut self, policy: VerifyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the strategy thresholds
    pub fn with_thresholds(mut self, thresholds: StrategyThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Replace the window and chunk sizes
    pub fn with_io_units(mut self, window_size: WindowSize, chunk_size: BufferSize) -> Self {
        self.window_size = window_size;
        self.chunk_size = chunk_size;
        self
    }

    /// Replace the free space margin
    pub fn with_free_space_margin(mut self, margin: u64) -> Self {
        self.free_space_margin = margin;
        self
    }

    /// Window or chunk size used by `strategy`, for decision records
    pub fn unit_size(&self, strategy: vericp_types::CopyStrategy) -> u64 {
        use vericp_types::CopyStrategy;
        match strategy {
            CopyStrategy::DirectSmall | CopyStrategy::DirectLarge => self.window_size.get(),
            CopyStrategy::Staged => self.chunk_size.get() as u64,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        let config = Config::default();
        Self {
            thresholds: StrategyThresholds::default(),
            max_file_size: config.thresholds.max_file_size,
            window_size: config.io.window_size,
            chunk_size: config.io.chunk_size,
            flush_every_windows: config.io.flush_every_windows,
            policy: VerifyPolicy::default(),
            digest: config.verification.algorithm,
            free_space_margin: config.safety.free_space_margin,
            progress_poll_interval: config.progress.poll_interval(),
            progress_capacity: config.progress.channel_capacity,
            max_concurrent_files: config.batch.max_concurrent_files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vericp_config::VerificationConfig;
    use vericp_types::CopyStrategy;

    #[test]
    fn test_default_matches_default_config() {
        let from_config = EngineSettings::from_config(&Config::default()).unwrap();
        assert_eq!(from_config, EngineSettings::default());
    }

    #[test]
    fn test_from_config_carries_policy() {
        let mut config = Config::default();
        config.verification = VerificationConfig::from_policy(
            VerifyPolicy::VerifyBelowThreshold(10),
            DigestPreference::Sha256,
        );
        config.thresholds.direct_large_enabled = false;

        let settings = EngineSettings::from_config(&config).unwrap();
        assert_eq!(settings.policy, VerifyPolicy::VerifyBelowThreshold(10));
        assert_eq!(settings.digest, DigestPreference::Sha256);
        assert!(!settings.thresholds.direct_large_enabled);
    }

    #[test]
    fn test_unit_size() {
        let settings = EngineSettings::default();
        assert_eq!(
            settings.unit_size(CopyStrategy::DirectLarge),
            settings.window_size.get()
        );
        assert_eq!(
            settings.unit_size(CopyStrategy::Staged),
            settings.chunk_size.get() as u64
        );
    }
}
