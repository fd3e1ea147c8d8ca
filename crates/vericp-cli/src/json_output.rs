//! JSON output structures for the vericp CLI

use serde::Serialize;
use vericp_types::{CopyOperationResult, CopyOutcome, StrategyDecision};

/// Operation metadata
#[derive(Debug, Serialize)]
pub struct OperationMetadata {
    /// vericp version
    pub version: String,
    /// Operation type
    pub operation: String,
    /// Timestamp when the report was produced (RFC 3339)
    pub timestamp: String,
}

impl OperationMetadata {
    fn new(operation: &str) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            operation: operation.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Totals over a copy run
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CopySummaryJson {
    /// Files requested
    pub files: usize,
    /// Files copied and verified
    pub succeeded: usize,
    /// Files that failed
    pub failed: usize,
    /// Files cancelled
    pub cancelled: usize,
    /// Bytes written by successful copies
    pub bytes_copied: u64,
}

impl CopySummaryJson {
    fn from_results(results: &[CopyOperationResult]) -> Self {
        let count = |outcome: CopyOutcome| results.iter().filter(|r| r.outcome == outcome).count();
        Self {
            files: results.len(),
            succeeded: count(CopyOutcome::Ok),
            failed: count(CopyOutcome::Error),
            cancelled: count(CopyOutcome::Cancelled),
            bytes_copied: results
                .iter()
                .filter(|r| r.is_success())
                .map(|r| r.bytes_transferred)
                .sum(),
        }
    }
}

/// Complete JSON output for `vericp copy`
#[derive(Debug, Serialize)]
pub struct CopyReportJson<'a> {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Totals
    pub summary: CopySummaryJson,
    /// One entry per requested file, in request order
    pub results: &'a [CopyOperationResult],
}

impl<'a> CopyReportJson<'a> {
    /// Build a report over `results`
    pub fn new(results: &'a [CopyOperationResult]) -> Self {
        Self {
            metadata: OperationMetadata::new("copy"),
            summary: CopySummaryJson::from_results(results),
            results,
        }
    }
}

/// Complete JSON output for `vericp plan`
#[derive(Debug, Serialize)]
pub struct PlanReportJson<'a> {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// The decision
    pub decision: &'a StrategyDecision,
}

impl<'a> PlanReportJson<'a> {
    /// Build a report for `decision`
    pub fn new(decision: &'a StrategyDecision) -> Self {
        Self {
            metadata: OperationMetadata::new("plan"),
            decision,
        }
    }
}

/// Print `value` as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use vericp_types::{CopyFailure, CopyStrategy, OperationId, VerificationMode};

    fn result(outcome: CopyOutcome, bytes: u64) -> CopyOperationResult {
        CopyOperationResult {
            operation_id: OperationId::nil(),
            source: PathBuf::from("a"),
            destination: PathBuf::from("b"),
            outcome,
            strategy: Some(CopyStrategy::DirectSmall),
            verification_mode: VerificationMode::WindowCompare,
            verification_passed: (outcome == CopyOutcome::Ok).then_some(true),
            bytes_total: bytes,
            bytes_transferred: bytes,
            elapsed: Duration::from_millis(1),
            failure: match outcome {
                CopyOutcome::Ok => None,
                CopyOutcome::Cancelled => Some(CopyFailure::cancelled("copy")),
                CopyOutcome::Error => Some(CopyFailure::write("disk full")),
            },
        }
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            result(CopyOutcome::Ok, 10),
            result(CopyOutcome::Ok, 5),
            result(CopyOutcome::Error, 3),
            result(CopyOutcome::Cancelled, 1),
        ];
        assert_eq!(
            CopySummaryJson::from_results(&results),
            CopySummaryJson {
                files: 4,
                succeeded: 2,
                failed: 1,
                cancelled: 1,
                bytes_copied: 15,
            }
        );
    }

    #[test]
    fn test_report_serializes_failure_kind() {
        let results = vec![result(CopyOutcome::Error, 3)];
        let value = serde_json::to_value(CopyReportJson::new(&results)).unwrap();
        assert_eq!(value["metadata"]["operation"], "copy");
        assert_eq!(value["results"][0]["failure"]["kind"], "copy_write_failed");
        assert_eq!(value["results"][0]["strategy"], "DIRECT_SMALL");
    }
}
