//! Configuration management for vericp
//!
//! The configuration is loaded once at process start and is read-only
//! afterwards. Sources are layered in this order, later ones winning:
//!
//! 1. Built-in defaults
//! 2. A configuration file (YAML, TOML or JSON, chosen by extension)
//! 3. Environment variables (`VERICP__SECTION__KEY`)
//!
//! # Examples
//!
//! ```rust
//! use vericp_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("vericp.yaml")
//!     .add_env_prefix("VERICP")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Window size: {}", config.io.window_size.get());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use vericp_types::{BufferSize, DigestPreference, VerifyPolicy, WindowSize};

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Main configuration structure for vericp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Strategy selection thresholds and size limits
    pub thresholds: ThresholdConfig,
    /// Window and chunk sizes
    pub io: IoConfig,
    /// Verification policy
    pub verification: VerificationConfig,
    /// Preflight safety checks
    pub safety: SafetyConfig,
    /// Progress reporting
    pub progress: ProgressConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Multi-file execution
    pub batch: BatchConfig,
}

/// Strategy selection thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Allow the DIRECT_LARGE strategy
    pub direct_large_enabled: bool,
    /// Files at least this large use DIRECT_LARGE between fixed local disks
    pub direct_large_threshold: u64,
    /// Files at least this large are not copied with DIRECT_SMALL
    /// (unset means no limit)
    pub direct_staged_threshold: Option<u64>,
    /// Hard limit; larger files are refused at preflight
    pub max_file_size: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            direct_large_enabled: true,
            direct_large_threshold: GIB,
            direct_staged_threshold: None,
            max_file_size: 1024 * GIB,
        }
    }
}

/// I/O unit sizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Window size for mapped copy and compare
    pub window_size: WindowSize,
    /// Chunk size for buffered copy and verify
    pub chunk_size: BufferSize,
    /// Flush the DIRECT_LARGE temp file every N windows (0 = only at the end)
    pub flush_every_windows: u32,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            window_size: WindowSize::default(),
            chunk_size: BufferSize::default(),
            flush_every_windows: 8,
        }
    }
}

/// Verification mode selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Never verify
    SkipAll,
    /// Verify every file
    #[default]
    VerifyAll,
    /// Verify files smaller than `verification.threshold`
    VerifyBelowThreshold,
}

/// Verification configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Which files are verified
    pub policy: PolicyMode,
    /// Size limit for `verify_below_threshold`
    pub threshold: Option<u64>,
    /// Digest algorithm preference
    pub algorithm: DigestPreference,
}

impl VerificationConfig {
    /// Resolve to the engine's policy value
    pub fn verify_policy(&self) -> ConfigResult<VerifyPolicy> {
        match (self.policy, self.threshold) {
            (PolicyMode::SkipAll, _) => Ok(VerifyPolicy::SkipAll),
            (PolicyMode::VerifyAll, _) => Ok(VerifyPolicy::VerifyAll),
            (PolicyMode::VerifyBelowThreshold, Some(limit)) => {
                Ok(VerifyPolicy::VerifyBelowThreshold(limit))
            }
            (PolicyMode::VerifyBelowThreshold, None) => Err(ConfigError::invalid_value(
                "verification.threshold",
                "required when policy is verify_below_threshold",
            )),
        }
    }

    /// Build a configuration section from a policy value
    pub fn from_policy(policy: VerifyPolicy, algorithm: DigestPreference) -> Self {
        let (policy, threshold) = match policy {
            VerifyPolicy::SkipAll => (PolicyMode::SkipAll, None),
            VerifyPolicy::VerifyAll => (PolicyMode::VerifyAll, None),
            VerifyPolicy::VerifyBelowThreshold(limit) => {
                (PolicyMode::VerifyBelowThreshold, Some(limit))
            }
        };
        Self {
            policy,
            threshold,
            algorithm,
        }
    }
}

/// Preflight safety configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Bytes that must remain free after the copy
    pub free_space_margin: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            free_space_margin: 64 * MIB,
        }
    }
}

/// Progress reporting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// How often the consumer drains the progress channel, in milliseconds
    pub poll_interval_ms: u64,
    /// Capacity of the progress channel; the oldest samples are dropped on
    /// overflow
    pub channel_capacity: usize,
}

impl ProgressConfig {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            channel_capacity: 64,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Emit logs as JSON
    pub json: bool,
    /// Append status records to this file as JSON lines
    pub status_log: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            status_log: None,
        }
    }
}

/// Multi-file execution configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Files copied concurrently
    pub max_concurrent_files: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: num_cpus::get().clamp(1, 8),
        }
    }
}
