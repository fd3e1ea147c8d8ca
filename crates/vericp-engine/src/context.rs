//! Per-file run context shared by the copy and verify loops

use crate::settings::EngineSettings;
use std::cell::Cell;
use std::fs::File;
use std::path::Path;
use vericp_types::{
    Cancellable, CancellationToken, CopyFailure, CopyPhase, OperationId, ProgressReporter,
    ProgressUpdate,
};

/// Everything one engine run needs besides its paths.
///
/// Lives on the worker thread for the duration of one request.
pub(crate) struct RunContext<'a> {
    pub operation_id: OperationId,
    pub settings: &'a EngineSettings,
    pub length: u64,
    progress: &'a dyn ProgressReporter,
    cancel: &'a CancellationToken,
    transferred: Cell<u64>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        operation_id: OperationId,
        settings: &'a EngineSettings,
        length: u64,
        progress: &'a dyn ProgressReporter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            operation_id,
            settings,
            length,
            progress,
            cancel,
            transferred: Cell::new(0),
        }
    }

    /// Push one progress sample
    pub fn report(&self, phase: CopyPhase, bytes_done: u64) {
        self.progress.report_progress(ProgressUpdate {
            operation_id: self.operation_id,
            phase,
            bytes_done,
            bytes_total: self.length,
        });
    }

    /// Record the number of bytes written to the temp file so far
    pub fn set_transferred(&self, bytes: u64) {
        self.transferred.set(bytes);
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with `Cancelled` if the token is set
    pub fn check_cancelled(&self, phase: &str) -> Result<(), CopyFailure> {
        if self.is_cancelled() {
            Err(CopyFailure::cancelled(phase))
        } else {
            Ok(())
        }
    }
}

/// Open `path` read-only, mapping the error to `failure`
pub(crate) fn open_read(
    path: &Path,
    failure: fn(String) -> CopyFailure,
) -> Result<File, CopyFailure> {
    File::open(path).map_err(|e| failure(format!("cannot open {}: {}", path.display(), e)))
}

/// Fail with `VerificationMismatch` if the source no longer has `expected`
/// bytes
pub(crate) fn ensure_source_length(
    source: &File,
    path: &Path,
    expected: u64,
) -> Result<(), CopyFailure> {
    let actual = source
        .metadata()
        .map_err(|e| CopyFailure::mismatch(format!("cannot stat {}: {}", path.display(), e)))?
        .len();
    if actual == expected {
        Ok(())
    } else {
        Err(CopyFailure::mismatch(format!(
            "source {} changed size during copy ({} -> {} bytes)",
            path.display(),
            expected,
            actual
        )))
    }
}
