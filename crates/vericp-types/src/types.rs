//! Core data types for vericp
//!
//! This module provides the data model shared by the classifier, the engines
//! and their callers: requests, the closed strategy/verification enums,
//! progress updates, the terminal per-file result and the status records.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::error::{CopyFailure, FailureKind};

/// Unique identifier for one copy operation, used for audit logging
pub type OperationId = uuid::Uuid;

/// Storage class of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LocationClass {
    /// Fixed local disk
    LocalFixed,
    /// Removable local media (USB sticks, card readers, optical)
    LocalRemovable,
    /// Network share reachable through a mapped drive or mount point
    NetworkMapped,
    /// UNC-style share syntax or a path whose volume cannot be determined
    Unresolvable,
}

impl LocationClass {
    /// Stable snake_case name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalFixed => "local_fixed",
            Self::LocalRemovable => "local_removable",
            Self::NetworkMapped => "network_mapped",
            Self::Unresolvable => "unresolvable",
        }
    }
}

impl fmt::Display for LocationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy strategy, selected once per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum CopyStrategy {
    /// Native whole-file copy, verified by windowed byte compare
    DirectSmall,
    /// Windowed memory-mapped copy with inline digest
    DirectLarge,
    /// Chunked buffered copy with progressive digest
    Staged,
}

impl CopyStrategy {
    /// Stable name used in decision records
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectSmall => "DIRECT_SMALL",
            Self::DirectLarge => "DIRECT_LARGE",
            Self::Staged => "STAGED",
        }
    }

    /// Verification mode bound to this strategy when the policy asks for one
    pub fn bound_verification(self) -> VerificationMode {
        match self {
            Self::DirectSmall => VerificationMode::WindowCompare,
            Self::DirectLarge | Self::Staged => VerificationMode::DigestCompare,
        }
    }
}

impl fmt::Display for CopyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a finished temp file is checked against its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum VerificationMode {
    /// Verification skipped by policy
    None,
    /// Windowed byte-for-byte compare of source and temp
    WindowCompare,
    /// Compare the copy-time digest with a digest of the temp file
    DigestCompare,
}

impl VerificationMode {
    /// Stable name used in decision records
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::WindowCompare => "WINDOW_COMPARE",
            Self::DigestCompare => "DIGEST_COMPARE",
        }
    }
}

impl fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide verification policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VerifyPolicy {
    /// Never verify
    SkipAll,
    /// Verify every file
    VerifyAll,
    /// Verify files strictly smaller than the given byte length
    VerifyBelowThreshold(u64),
}

impl VerifyPolicy {
    /// Whether a file of `length` bytes must be verified
    pub fn requires_verification(self, length: u64) -> bool {
        match self {
            Self::SkipAll => false,
            Self::VerifyAll => true,
            Self::VerifyBelowThreshold(limit) => length < limit,
        }
    }
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self::VerifyAll
    }
}

impl fmt::Display for VerifyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkipAll => f.write_str("skip-all"),
            Self::VerifyAll => f.write_str("verify-all"),
            Self::VerifyBelowThreshold(limit) => write!(f, "verify-below-{}", limit),
        }
    }
}

/// Content digest algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DigestAlgorithm {
    /// BLAKE3 tree hash
    Blake3,
    /// SHA-256
    Sha256,
}

impl DigestAlgorithm {
    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested digest algorithm before availability is taken into account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DigestPreference {
    /// Fastest available algorithm
    #[default]
    Auto,
    /// BLAKE3 if compiled in, otherwise SHA-256
    Blake3,
    /// Always SHA-256
    Sha256,
}

/// A request to copy one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Source file
    pub source: PathBuf,
    /// Destination file
    pub destination: PathBuf,
    /// Owning operation, for audit logging
    pub operation_id: OperationId,
}

impl CopyRequest {
    /// Create a request with a fresh operation id
    pub fn new<P1: Into<PathBuf>, P2: Into<PathBuf>>(source: P1, destination: P2) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            operation_id: OperationId::new_v4(),
        }
    }

    /// Use an existing operation id (e.g. the id of a batch)
    pub fn with_operation_id(mut self, operation_id: OperationId) -> Self {
        self.operation_id = operation_id;
        self
    }
}

/// Which pass a progress update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CopyPhase {
    /// Writing the temp file
    Copying,
    /// Verifying the temp file
    Verifying,
}

/// One progress sample pushed from a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProgressUpdate {
    /// Operation the sample belongs to
    pub operation_id: OperationId,
    /// Current pass
    pub phase: CopyPhase,
    /// Bytes completed in this pass
    pub bytes_done: u64,
    /// Total bytes of this pass
    pub bytes_total: u64,
}

impl ProgressUpdate {
    /// Completion of this pass as a percentage
    pub fn percent(&self) -> f64 {
        if self.bytes_total > 0 {
            (self.bytes_done as f64 / self.bytes_total as f64) * 100.0
        } else {
            100.0
        }
    }
}

/// Creation and modification time of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileTimes {
    /// Creation (birth) time, where the platform records one
    pub created: Option<SystemTime>,
    /// Last modification time
    pub modified: SystemTime,
}

/// Terminal outcome tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CopyOutcome {
    /// Destination now holds a verified copy of the source
    Ok,
    /// Cancelled by the user; destination restored
    Cancelled,
    /// Failed; destination restored
    Error,
}

impl fmt::Display for CopyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Terminal, immutable record of one copy attempt
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CopyOperationResult {
    /// Owning operation
    pub operation_id: OperationId,
    /// Source path as requested
    pub source: PathBuf,
    /// Destination path as requested
    pub destination: PathBuf,
    /// Outcome tag
    pub outcome: CopyOutcome,
    /// Strategy used; `None` only when preflight failed before selection
    pub strategy: Option<CopyStrategy>,
    /// Verification mode in effect
    pub verification_mode: VerificationMode,
    /// `None` when verification was not applicable or never reached
    pub verification_passed: Option<bool>,
    /// Source length captured at preflight
    pub bytes_total: u64,
    /// Bytes written to the temp file
    pub bytes_transferred: u64,
    /// Wall-clock time for the whole state machine
    pub elapsed: Duration,
    /// Classified failure for `Cancelled` and `Error` outcomes
    pub failure: Option<CopyFailure>,
}

impl CopyOperationResult {
    /// Whether the copy succeeded
    pub fn is_success(&self) -> bool {
        self.outcome == CopyOutcome::Ok
    }

    /// Failure kind, if any
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    /// Average throughput in bytes per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_transferred as f64 / secs
        } else {
            0.0
        }
    }
}

/// The strategy selector's decision for one file.
///
/// Emitted once per file before any byte is copied.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StrategyDecision {
    /// Owning operation
    pub operation_id: OperationId,
    /// Source path
    pub source: PathBuf,
    /// Destination path
    pub destination: PathBuf,
    /// Source storage class
    pub source_class: LocationClass,
    /// Destination storage class
    pub destination_class: LocationClass,
    /// Source length in bytes
    pub length: u64,
    /// Selected strategy
    pub strategy: CopyStrategy,
    /// Which precedence rule matched
    pub rule: u8,
    /// Window size (DIRECT engines) or chunk size (STAGED) in bytes
    pub unit_size: u64,
    /// Verification mode after applying the policy
    pub verification_mode: VerificationMode,
    /// Policy in effect
    pub policy: VerifyPolicy,
    /// Digest algorithm, if a hasher will be instantiated
    pub digest: Option<DigestAlgorithm>,
}

/// Per-file performance summary
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerformanceSummary {
    /// Owning operation
    pub operation_id: OperationId,
    /// Source path
    pub source: PathBuf,
    /// Destination path
    pub destination: PathBuf,
    /// Strategy used
    pub strategy: Option<CopyStrategy>,
    /// Outcome tag
    pub outcome: CopyOutcome,
    /// Failure kind, if any
    pub failure: Option<FailureKind>,
    /// Verification mode in effect
    pub verification_mode: VerificationMode,
    /// Verification result
    pub verification_passed: Option<bool>,
    /// Bytes written
    pub bytes_transferred: u64,
    /// Elapsed milliseconds
    pub elapsed_ms: u64,
    /// Throughput in MiB/s
    pub throughput_mib_s: f64,
}

impl From<&CopyOperationResult> for PerformanceSummary {
    fn from(result: &CopyOperationResult) -> Self {
        Self {
            operation_id: result.operation_id,
            source: result.source.clone(),
            destination: result.destination.clone(),
            strategy: result.strategy,
            outcome: result.outcome,
            failure: result.failure_kind(),
            verification_mode: result.verification_mode,
            verification_passed: result.verification_passed,
            bytes_transferred: result.bytes_transferred,
            elapsed_ms: result.elapsed.as_millis() as u64,
            throughput_mib_s: result.throughput() / (1024.0 * 1024.0),
        }
    }
}

/// Single-line structured record for the status sink
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "record", rename_all = "snake_case"))]
pub enum StatusRecord {
    /// Strategy decision explainer
    Decision(StrategyDecision),
    /// Per-file performance summary
    Performance(PerformanceSummary),
}
