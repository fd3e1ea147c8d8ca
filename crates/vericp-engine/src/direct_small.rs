//! DIRECT_SMALL: native whole-file copy, verified by windowed compare

use crate::context::RunContext;
use crate::verify;
use std::path::Path;
use tracing::debug;
use vericp_io::{copy_file_native, NativeCopyOutcome};
use vericp_types::{CopyFailure, CopyPhase};

/// Copy `source` into a new `temp` file with the platform copy primitive.
///
/// The progress callback doubles as the cancellation check.
pub(crate) fn copy(ctx: &RunContext<'_>, source: &Path, temp: &Path) -> Result<(), CopyFailure> {
    ctx.check_cancelled("copy")?;

    let mut on_progress = |done: u64, _total: u64| {
        ctx.set_transferred(done);
        ctx.report(CopyPhase::Copying, done);
        !ctx.is_cancelled()
    };

    let outcome = copy_file_native(
        source,
        temp,
        ctx.settings.chunk_size.get(),
        &mut on_progress,
    )
    .map_err(|e| CopyFailure::write(e.to_string()))?;

    match outcome {
        NativeCopyOutcome::Completed(bytes) => {
            ctx.set_transferred(bytes);
            debug!("Native copy finished: {} bytes", bytes);
            Ok(())
        }
        NativeCopyOutcome::Cancelled(bytes) => {
            ctx.set_transferred(bytes);
            Err(CopyFailure::cancelled("copy"))
        }
    }
}

/// Window-compare the finished temp file against the source
pub(crate) fn verify(ctx: &RunContext<'_>, source: &Path, temp: &Path) -> Result<(), CopyFailure> {
    verify::window_compare(ctx, source, temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::EngineSettings;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use vericp_types::{
        BufferSize, CallbackReporter, Cancellable, CancellationToken, FailureKind, NoProgress,
        OperationId, ProgressUpdate, WindowSize,
    };

    fn settings() -> EngineSettings {
        EngineSettings::default().with_io_units(
            WindowSize::new(WindowSize::GRANULARITY).unwrap(),
            BufferSize::new(BufferSize::MIN).unwrap(),
        )
    }

    #[test]
    fn test_copy_and_verify() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("in.txt");
        let temp = temp_dir.path().join("out.txt.copying.tmp");
        let data = vec![7u8; 10 * 1024];
        std::fs::write(&source, &data).unwrap();

        let settings = settings();
        let cancel = CancellationToken::new();
        let seen = Arc::new(AtomicU64::new(0));
        let observer = Arc::clone(&seen);
        let reporter = CallbackReporter(move |u: ProgressUpdate| {
            observer.fetch_max(u.bytes_done, Ordering::SeqCst);
        });
        let ctx = RunContext::new(OperationId::nil(), &settings, 10 * 1024, &reporter, &cancel);

        copy(&ctx, &source, &temp).unwrap();
        verify(&ctx, &source, &temp).unwrap();
        assert_eq!(ctx.transferred(), 10 * 1024);
        assert_eq!(seen.load(Ordering::SeqCst), 10 * 1024);
        assert_eq!(std::fs::read(&temp).unwrap(), data);
    }

    #[test]
    fn test_cancelled_before_start_creates_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("in.txt");
        let temp = temp_dir.path().join("out.tmp");
        std::fs::write(&source, b"hello").unwrap();

        let settings = settings();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = RunContext::new(OperationId::nil(), &settings, 5, &NoProgress, &cancel);

        let failure = copy(&ctx, &source, &temp).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert!(!temp.exists());
    }

    #[test]
    fn test_existing_temp_is_a_write_failure() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("in.txt");
        let temp = temp_dir.path().join("out.tmp");
        std::fs::write(&source, b"hello").unwrap();
        std::fs::write(&temp, b"stale").unwrap();

        let settings = settings();
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(OperationId::nil(), &settings, 5, &NoProgress, &cancel);

        let failure = copy(&ctx, &source, &temp).unwrap_err();
        assert_eq!(failure.kind, FailureKind::CopyWriteFailed);
    }
}
