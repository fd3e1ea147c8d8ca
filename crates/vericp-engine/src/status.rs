//! Status sinks for decision and performance records

use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use vericp_types::{StatusRecord, StatusSink};

/// Writes each record as a structured `tracing` event under the
/// `vericp::status` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn record(&self, record: &StatusRecord) {
        match record {
            StatusRecord::Decision(decision) => info!(
                target: "vericp::status",
                operation_id = %decision.operation_id,
                source = %decision.source.display(),
                destination = %decision.destination.display(),
                source_class = %decision.source_class,
                destination_class = %decision.destination_class,
                length = decision.length,
                strategy = %decision.strategy,
                rule = decision.rule,
                unit_size = decision.unit_size,
                verification = %decision.verification_mode,
                policy = %decision.policy,
                digest = decision.digest.map(|d| d.as_str()),
                "strategy decision"
            ),
            StatusRecord::Performance(summary) => info!(
                target: "vericp::status",
                operation_id = %summary.operation_id,
                source = %summary.source.display(),
                destination = %summary.destination.display(),
                strategy = summary.strategy.map(|s| s.as_str()),
                outcome = %summary.outcome,
                failure = summary.failure.map(|f| f.as_str()),
                verification = %summary.verification_mode,
                verification_passed = ?summary.verification_passed,
                bytes = summary.bytes_transferred,
                elapsed_ms = summary.elapsed_ms,
                throughput_mib_s = summary.throughput_mib_s,
                "copy finished"
            ),
        }
    }
}

/// Writes each record as one JSON line and flushes it immediately
#[derive(Debug)]
pub struct JsonLinesStatusSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesStatusSink<W> {
    /// Wrap `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W: Write + Send> StatusSink for JsonLinesStatusSink<W> {
    fn record(&self, record: &StatusRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize status record: {}", e);
                return;
            }
        };

        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = writeln!(writer, "{}", line).and_then(|()| writer.flush()) {
            warn!("Failed to write status record: {}", e);
        }
    }
}

/// Forwards each record to every inner sink in order
#[derive(Clone, Default)]
pub struct FanoutStatusSink {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl FanoutStatusSink {
    /// Create an empty fan-out
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    pub fn with(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl StatusSink for FanoutStatusSink {
    fn record(&self, record: &StatusRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use vericp_types::{
        CopyOperationResult, CopyOutcome, CopyStrategy, LocationClass, OperationId,
        PerformanceSummary, StrategyDecision, VerificationMode, VerifyPolicy,
    };

    fn decision() -> StatusRecord {
        StatusRecord::Decision(StrategyDecision {
            operation_id: OperationId::nil(),
            source: PathBuf::from("/data/in.bin"),
            destination: PathBuf::from("/data/out.bin"),
            source_class: LocationClass::LocalFixed,
            destination_class: LocationClass::NetworkMapped,
            length: 10,
            strategy: CopyStrategy::Staged,
            rule: 1,
            unit_size: 4096,
            verification_mode: VerificationMode::DigestCompare,
            policy: VerifyPolicy::VerifyAll,
            digest: None,
        })
    }

    fn performance() -> StatusRecord {
        let result = CopyOperationResult {
            operation_id: OperationId::nil(),
            source: PathBuf::from("/data/in.bin"),
            destination: PathBuf::from("/data/out.bin"),
            outcome: CopyOutcome::Ok,
            strategy: Some(CopyStrategy::DirectSmall),
            verification_mode: VerificationMode::WindowCompare,
            verification_passed: Some(true),
            bytes_total: 10,
            bytes_transferred: 10,
            elapsed: Duration::from_millis(5),
            failure: None,
        };
        StatusRecord::Performance(PerformanceSummary::from(&result))
    }

    #[test]
    fn test_json_lines_one_record_per_line() {
        let sink = JsonLinesStatusSink::new(Vec::new());
        sink.record(&decision());
        sink.record(&performance());

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["record"], "decision");
        assert_eq!(first["strategy"], "STAGED");
        assert_eq!(first["rule"], 1);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["record"], "performance");
        assert_eq!(second["outcome"], "ok");
        assert_eq!(second["verification_passed"], true);
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(JsonLinesStatusSink::new(Vec::new()));
        let second = Arc::new(JsonLinesStatusSink::new(Vec::new()));
        let fanout = FanoutStatusSink::new()
            .with(first.clone())
            .with(second.clone())
            .with(Arc::new(TracingStatusSink));

        fanout.record(&decision());
        drop(fanout);

        for sink in [first, second] {
            let sink = Arc::try_unwrap(sink).unwrap();
            assert_eq!(String::from_utf8(sink.into_inner()).unwrap().lines().count(), 1);
        }
    }
}
