//! DIRECT_LARGE: windowed memory-mapped copy with an inline digest
//!
//! The temp file is pre-allocated to the full source length, then each
//! window of the source is mapped read-only, copied into the matching
//! read-write window of the temp file and fed to the hasher. A window that
//! cannot be mapped or written fails the whole copy; there is no buffered
//! fallback here. Verification hashes the finished temp file once and never
//! re-reads the source.

use crate::context::{ensure_source_length, open_read, RunContext};
use crate::verify;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::debug;
use vericp_io::{preallocate, ContentDigest, ContentHasher, ReadWindow, WriteWindow};
use vericp_types::{CopyFailure, CopyPhase, DigestAlgorithm, FailureKind};

const PHASE: &str = "copy";

fn create_temp(ctx: &RunContext<'_>, temp: &Path) -> Result<File, CopyFailure> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(temp)
        .map_err(|e| {
            CopyFailure::new(
                FailureKind::PreallocationFailed,
                format!("cannot create {}: {}", temp.display(), e),
            )
        })?;

    preallocate(&file, temp, ctx.length)
        .map_err(|e| CopyFailure::new(FailureKind::PreallocationFailed, e.to_string()))?;
    Ok(file)
}

fn sync(file: &File, temp: &Path, all: bool) -> Result<(), CopyFailure> {
    let result = if all { file.sync_all() } else { file.sync_data() };
    result.map_err(|e| CopyFailure::write(format!("cannot flush {}: {}", temp.display(), e)))
}

/// Copy `source` into `temp`, returning the source digest when `algorithm`
/// is set
pub(crate) fn copy(
    ctx: &RunContext<'_>,
    source: &Path,
    temp: &Path,
    algorithm: Option<DigestAlgorithm>,
) -> Result<Option<ContentDigest>, CopyFailure> {
    ctx.check_cancelled(PHASE)?;
    let source_file = open_read(source, CopyFailure::write)?;
    let temp_file = create_temp(ctx, temp)?;

    let window = ctx.settings.window_size;
    let flush_every = u64::from(ctx.settings.flush_every_windows);
    let mut hasher = algorithm.map(ContentHasher::new);
    let mut done = 0u64;
    ctx.report(CopyPhase::Copying, 0);

    for index in 0..window.window_count(ctx.length) {
        ctx.check_cancelled(PHASE)?;
        let (offset, len) = window.window_bounds(index, ctx.length);

        // A shrunken source would fault the mapping
        ensure_source_length(&source_file, source, ctx.length)?;

        let input = ReadWindow::map(&source_file, source, offset, len)
            .map_err(|e| CopyFailure::write(e.to_string()))?;
        let mut output = WriteWindow::map(&temp_file, temp, offset, len)
            .map_err(|e| CopyFailure::write(e.to_string()))?;

        output.copy_from_slice(&input);
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&input);
        }

        if flush_every > 0 && (index + 1) % flush_every == 0 {
            output
                .flush()
                .map_err(|e| CopyFailure::write(e.to_string()))?;
            drop(output);
            sync(&temp_file, temp, false)?;
            debug!("Flushed {} after window {}", temp.display(), index);
        } else {
            drop(output);
        }
        drop(input);

        done += len as u64;
        ctx.set_transferred(done);
        ctx.report(CopyPhase::Copying, done);
    }

    sync(&temp_file, temp, true)?;
    debug!("Mapped copy finished: {} bytes", done);
    Ok(hasher.map(ContentHasher::finalize))
}

/// Hash the finished temp file and compare with the copy-time digest
pub(crate) fn verify(
    ctx: &RunContext<'_>,
    temp: &Path,
    copied: &ContentDigest,
) -> Result<(), CopyFailure> {
    let verified = verify::digest_mapped(ctx, temp, copied.algorithm())?;
    verify::compare_digests(copied, &verified, temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::EngineSettings;
    use rstest::rstest;
    use tempfile::TempDir;
    use vericp_types::{BufferSize, CancellationToken, NoProgress, OperationId, WindowSize};

    fn settings(flush_every_windows: u32) -> EngineSettings {
        let mut settings = EngineSettings::default().with_io_units(
            WindowSize::new(WindowSize::GRANULARITY).unwrap(),
            BufferSize::new(BufferSize::MIN).unwrap(),
        );
        settings.flush_every_windows = flush_every_windows;
        settings
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    fn test_copy_and_verify(#[case] flush_every_windows: u32) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("big.bin");
        let temp = temp_dir.path().join("big.out.copying.tmp");
        let data = pattern(WindowSize::GRANULARITY as usize * 3 + 999);
        std::fs::write(&source, &data).unwrap();

        let settings = settings(flush_every_windows);
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(
            OperationId::nil(),
            &settings,
            data.len() as u64,
            &NoProgress,
            &cancel,
        );

        let digest = copy(&ctx, &source, &temp, Some(DigestAlgorithm::Sha256))
            .unwrap()
            .unwrap();
        verify(&ctx, &temp, &digest).unwrap();
        assert_eq!(ctx.transferred(), data.len() as u64);
        assert_eq!(std::fs::read(&temp).unwrap(), data);
    }

    #[test]
    fn test_no_hasher_without_algorithm() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("big.bin");
        let temp = temp_dir.path().join("big.tmp");
        std::fs::write(&source, pattern(5000)).unwrap();

        let settings = settings(8);
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(OperationId::nil(), &settings, 5000, &NoProgress, &cancel);

        assert!(copy(&ctx, &source, &temp, None).unwrap().is_none());
    }

    #[test]
    fn test_existing_temp_is_a_preallocation_failure() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("big.bin");
        let temp = temp_dir.path().join("big.tmp");
        std::fs::write(&source, pattern(5000)).unwrap();
        std::fs::write(&temp, b"left over").unwrap();

        let settings = settings(8);
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(OperationId::nil(), &settings, 5000, &NoProgress, &cancel);

        let failure = copy(&ctx, &source, &temp, None).unwrap_err();
        assert_eq!(failure.kind, FailureKind::PreallocationFailed);
        assert_eq!(std::fs::read(&temp).unwrap(), b"left over");
    }

    #[test]
    fn test_shrunken_source_is_a_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("big.bin");
        let temp = temp_dir.path().join("big.tmp");
        std::fs::write(&source, pattern(4000)).unwrap();

        let settings = settings(8);
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(OperationId::nil(), &settings, 5000, &NoProgress, &cancel);

        let failure = copy(&ctx, &source, &temp, None).unwrap_err();
        assert_eq!(failure.kind, FailureKind::VerificationMismatch);
    }
}
