//! Unified test utilities for vericp integration tests

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use vericp_engine::{CopyEngine, EngineSettings, StrategyThresholds};
use vericp_io::{digest_reader, ContentDigest};
use vericp_types::{
    BufferSize, DigestAlgorithm, LocationClass, LocationClassifier, StatusRecord, StatusSink,
    WindowSize,
};

/// Test data generation patterns
#[derive(Debug, Clone, Copy)]
pub enum TestDataPattern {
    /// All zeros
    Zeros,
    /// Deterministic byte sequence with no short period
    Realistic,
}

/// Generate test data with the specified pattern
pub fn generate_test_data(size: usize, pattern: TestDataPattern) -> Vec<u8> {
    match pattern {
        TestDataPattern::Zeros => vec![0u8; size],
        TestDataPattern::Realistic => (0..size).map(|i| ((i * 7 + 13) % 251) as u8).collect(),
    }
}

/// Create a file with test data in `temp_dir`
pub fn create_test_file(temp_dir: &TempDir, name: &str, size: usize) -> PathBuf {
    let path = temp_dir.path().join(name);
    fs::write(&path, generate_test_data(size, TestDataPattern::Realistic))
        .expect("Failed to create test file");
    path
}

/// Set a file's modification time to `secs` after the epoch and return it
pub fn set_modified(path: &Path, secs: u64) -> SystemTime {
    let time = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
    filetime::set_file_mtime(path, filetime::FileTime::from_system_time(time))
        .expect("Failed to set mtime");
    time
}

/// Modification time of `path`
pub fn modified(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .expect("Failed to read mtime")
}

/// SHA-256 of a file's content
pub fn file_digest(path: &Path) -> ContentDigest {
    let file = fs::File::open(path).expect("Failed to open file");
    digest_reader(file, DigestAlgorithm::Sha256, 64 * 1024).expect("Failed to digest file")
}

/// Names of the entries of a directory, sorted
pub fn dir_entries(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .expect("Failed to read directory")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Classifier that reports the same class for every path
#[derive(Debug, Clone, Copy)]
pub struct FixedClassifier(pub LocationClass);

impl LocationClassifier for FixedClassifier {
    fn classify(&self, _path: &Path) -> LocationClass {
        self.0
    }
}

/// Status sink that keeps every record in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<StatusRecord>>,
}

impl RecordingSink {
    /// Records written so far
    pub fn records(&self) -> Vec<StatusRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingSink {
    fn record(&self, record: &StatusRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// Settings with the smallest legal window and chunk, no free space
/// margin, and DIRECT_LARGE from `direct_large_threshold` bytes
pub fn small_unit_settings(direct_large_threshold: u64) -> EngineSettings {
    EngineSettings::default()
        .with_io_units(
            WindowSize::new(WindowSize::GRANULARITY).unwrap(),
            BufferSize::new(BufferSize::MIN).unwrap(),
        )
        .with_thresholds(StrategyThresholds {
            direct_large_enabled: true,
            direct_large_threshold,
            direct_staged_threshold: None,
        })
        .with_free_space_margin(0)
}

/// Engine whose classifier reports `class` for every path
pub fn engine_with(
    class: LocationClass,
    settings: EngineSettings,
    status: Arc<RecordingSink>,
) -> CopyEngine {
    CopyEngine::builder()
        .with_settings(settings)
        .with_classifier(Arc::new(FixedClassifier(class)))
        .with_status_sink(status)
        .build()
}
