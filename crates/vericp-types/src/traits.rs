//! Collaborator traits for vericp
//!
//! These are the seams between the copy engine and the outside world: where
//! progress goes, how cancellation is observed, how a path is classified, how
//! timestamps are read and written, and where status records are written.

use crate::{FileTimes, LocationClass, ProgressUpdate, Result, StatusRecord};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receiver of progress samples. Implementations must never block the worker.
pub trait ProgressReporter: Send + Sync {
    /// Report one progress sample
    fn report_progress(&self, update: ProgressUpdate);
}

/// Reporter that discards every sample
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report_progress(&self, _update: ProgressUpdate) {}
}

/// Adapter turning a closure into a [`ProgressReporter`]
pub struct CallbackReporter<F>(pub F);

impl<F> ProgressReporter for CallbackReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report_progress(&self, update: ProgressUpdate) {
        (self.0)(update);
    }
}

/// Trait for operation cancellation
pub trait Cancellable {
    /// Cancel the operation
    fn cancel(&self);

    /// Check if the operation is cancelled
    fn is_cancelled(&self) -> bool;
}

/// Cooperative cancellation flag shared between a consumer and its workers.
///
/// Cloning shares the flag. Workers poll it at window and chunk boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create an unset token
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cancellable for CancellationToken {
    fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Storage-class probe for a path
pub trait LocationClassifier: Send + Sync {
    /// Classify `path`. Paths that do not exist yet are classified by their
    /// nearest existing ancestor.
    fn classify(&self, path: &Path) -> LocationClass;
}

/// Reads and writes creation/modification times
pub trait TimestampAccessor: Send + Sync {
    /// Read the times of `path`
    fn get_times(&self, path: &Path) -> Result<FileTimes>;

    /// Apply `times` to `path`; returns whether every supported field was set
    fn set_times(&self, path: &Path, times: &FileTimes) -> bool;
}

/// Destination for single-line status records.
///
/// Records must be written through immediately, never buffered.
pub trait StatusSink: Send + Sync {
    /// Write one record
    fn record(&self, record: &StatusRecord);
}
