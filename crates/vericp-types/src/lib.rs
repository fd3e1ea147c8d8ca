//! Core type system and error handling for vericp
//!
//! This crate provides the foundational types shared by every vericp crate:
//!
//! - **Error handling**: the building-block [`Error`] and the per-file
//!   [`CopyFailure`] classification
//! - **Data model**: requests, strategies, verification modes, progress
//!   samples, results and status records
//! - **Traits**: the collaborator seams (progress, cancellation, location
//!   classification, timestamps, status sink)
//! - **Sizes**: validated window and chunk sizes
//!
//! # Features
//!
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use vericp_types::{CopyStrategy, VerificationMode, VerifyPolicy};
//!
//! let mode = if VerifyPolicy::VerifyBelowThreshold(1024).requires_verification(10) {
//!     CopyStrategy::DirectSmall.bound_verification()
//! } else {
//!     VerificationMode::None
//! };
//! assert_eq!(mode, VerificationMode::WindowCompare);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{BufferSize, WindowSize};
pub use error::{CopyFailure, Error, ErrorKind, ErrorSeverity, FailureKind};
pub use result::Result;
pub use traits::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result_with(outcome: CopyOutcome, bytes: u64, elapsed: Duration) -> CopyOperationResult {
        CopyOperationResult {
            operation_id: OperationId::nil(),
            source: "a".into(),
            destination: "b".into(),
            outcome,
            strategy: Some(CopyStrategy::Staged),
            verification_mode: VerificationMode::DigestCompare,
            verification_passed: Some(true),
            bytes_total: bytes,
            bytes_transferred: bytes,
            elapsed,
            failure: None,
        }
    }

    #[test]
    fn test_strategy_binds_verification() {
        assert_eq!(
            CopyStrategy::DirectSmall.bound_verification(),
            VerificationMode::WindowCompare
        );
        assert_eq!(
            CopyStrategy::DirectLarge.bound_verification(),
            VerificationMode::DigestCompare
        );
        assert_eq!(
            CopyStrategy::Staged.bound_verification(),
            VerificationMode::DigestCompare
        );
    }

    #[test]
    fn test_verify_policy_threshold_is_exclusive() {
        let policy = VerifyPolicy::VerifyBelowThreshold(100);
        assert!(policy.requires_verification(99));
        assert!(!policy.requires_verification(100));
        assert!(!VerifyPolicy::SkipAll.requires_verification(0));
        assert!(VerifyPolicy::VerifyAll.requires_verification(u64::MAX));
    }

    #[test]
    fn test_result_throughput() {
        let result = result_with(CopyOutcome::Ok, 2048, Duration::from_secs(2));
        assert!(result.is_success());
        assert_eq!(result.throughput(), 1024.0);

        let instant = result_with(CopyOutcome::Ok, 2048, Duration::ZERO);
        assert_eq!(instant.throughput(), 0.0);
    }

    #[test]
    fn test_performance_summary_from_result() {
        let result = result_with(CopyOutcome::Cancelled, 10, Duration::from_millis(1500));
        let summary = PerformanceSummary::from(&result);
        assert_eq!(summary.elapsed_ms, 1500);
        assert_eq!(summary.outcome, CopyOutcome::Cancelled);
        assert_eq!(summary.strategy, Some(CopyStrategy::Staged));
    }
}
