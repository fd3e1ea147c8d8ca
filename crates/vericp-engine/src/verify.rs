//! Verification engines
//!
//! - [`window_compare`]: windowed byte compare of source and temp (DIRECT_SMALL)
//! - [`digest_mapped`]: one mapped pass over the temp file (DIRECT_LARGE)
//! - [`digest_buffered`]: one buffered pass over the temp file (STAGED)
//!
//! Any I/O error while verifying means the copy cannot be proven correct and
//! is reported as a verification mismatch.

use crate::context::{open_read, RunContext};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};
use vericp_io::{ContentDigest, ContentHasher, ReadWindow};
use vericp_types::{CopyFailure, CopyPhase, DigestAlgorithm};

const PHASE: &str = "verify";

fn read_failure(path: &Path, offset: u64, error: &io::Error) -> CopyFailure {
    CopyFailure::mismatch(format!(
        "cannot read {} at offset {}: {}",
        path.display(),
        offset,
        error
    ))
}

fn check_length(file: &File, path: &Path, expected: u64) -> Result<(), CopyFailure> {
    let actual = file
        .metadata()
        .map_err(|e| CopyFailure::mismatch(format!("cannot stat {}: {}", path.display(), e)))?
        .len();
    if actual == expected {
        Ok(())
    } else {
        Err(CopyFailure::mismatch(format!(
            "{} has {} bytes, expected {}",
            path.display(),
            actual,
            expected
        )))
    }
}

/// Compare `source` and `temp` window by window, stopping at the first
/// difference.
///
/// A window that cannot be mapped is compared with buffered reads instead;
/// the next window is mapped again.
pub(crate) fn window_compare(
    ctx: &RunContext<'_>,
    source: &Path,
    temp: &Path,
) -> Result<(), CopyFailure> {
    let source_file = open_read(source, CopyFailure::mismatch)?;
    let temp_file = open_read(temp, CopyFailure::mismatch)?;
    check_length(&source_file, source, ctx.length)?;
    check_length(&temp_file, temp, ctx.length)?;

    let window = ctx.settings.window_size;
    let mut done = 0u64;
    ctx.report(CopyPhase::Verifying, 0);

    for index in 0..window.window_count(ctx.length) {
        ctx.check_cancelled(PHASE)?;
        let (offset, len) = window.window_bounds(index, ctx.length);

        let mismatch_at = match (
            ReadWindow::map(&source_file, source, offset, len),
            ReadWindow::map(&temp_file, temp, offset, len),
        ) {
            (Ok(expected), Ok(actual)) => first_difference(&expected, &actual),
            (Err(e), _) | (_, Err(e)) => {
                warn!("{}; comparing window at {} with buffered reads", e, offset);
                buffered_compare(ctx, (&source_file, source), (&temp_file, temp), offset, len)?
            }
        };

        if let Some(position) = mismatch_at {
            return Err(CopyFailure::mismatch(format!(
                "{} differs from {} at byte {}",
                temp.display(),
                source.display(),
                offset + position as u64
            )));
        }

        done += len as u64;
        ctx.report(CopyPhase::Verifying, done);
    }

    debug!("Window compare passed for {} ({} bytes)", temp.display(), done);
    Ok(())
}

fn first_difference(expected: &[u8], actual: &[u8]) -> Option<usize> {
    if expected == actual {
        None
    } else {
        expected
            .iter()
            .zip(actual)
            .position(|(a, b)| a != b)
            .or(Some(expected.len().min(actual.len())))
    }
}

/// Compare `len` bytes at `offset` of both files through chunk buffers.
/// Returns the position of the first difference relative to `offset`.
fn buffered_compare(
    ctx: &RunContext<'_>,
    (mut source_file, source): (&File, &Path),
    (mut temp_file, temp): (&File, &Path),
    offset: u64,
    len: usize,
) -> Result<Option<usize>, CopyFailure> {
    let chunk = ctx.settings.chunk_size.get();
    let mut expected = vec![0u8; chunk];
    let mut actual = vec![0u8; chunk];

    source_file
        .seek(SeekFrom::Start(offset))
        .map_err(|e| read_failure(source, offset, &e))?;
    temp_file
        .seek(SeekFrom::Start(offset))
        .map_err(|e| read_failure(temp, offset, &e))?;

    let mut compared = 0usize;
    while compared < len {
        let n = chunk.min(len - compared);
        let at = offset + compared as u64;
        source_file
            .read_exact(&mut expected[..n])
            .map_err(|e| read_failure(source, at, &e))?;
        temp_file
            .read_exact(&mut actual[..n])
            .map_err(|e| read_failure(temp, at, &e))?;

        if let Some(position) = first_difference(&expected[..n], &actual[..n]) {
            return Ok(Some(compared + position));
        }
        compared += n;
    }
    Ok(None)
}

/// Digest `temp` through mapped windows, in a single sequential pass
pub(crate) fn digest_mapped(
    ctx: &RunContext<'_>,
    temp: &Path,
    algorithm: DigestAlgorithm,
) -> Result<ContentDigest, CopyFailure> {
    let file = open_read(temp, CopyFailure::mismatch)?;
    check_length(&file, temp, ctx.length)?;

    let window = ctx.settings.window_size;
    let mut hasher = ContentHasher::new(algorithm);
    let mut done = 0u64;
    ctx.report(CopyPhase::Verifying, 0);

    for index in 0..window.window_count(ctx.length) {
        ctx.check_cancelled(PHASE)?;
        let (offset, len) = window.window_bounds(index, ctx.length);
        let mapped = ReadWindow::map(&file, temp, offset, len)
            .map_err(|e| CopyFailure::mismatch(e.to_string()))?;
        hasher.update(&mapped);
        drop(mapped);

        done += len as u64;
        ctx.report(CopyPhase::Verifying, done);
    }

    Ok(hasher.finalize())
}

/// Digest `temp` with buffered chunk reads, in a single sequential pass
pub(crate) fn digest_buffered(
    ctx: &RunContext<'_>,
    temp: &Path,
    algorithm: DigestAlgorithm,
) -> Result<ContentDigest, CopyFailure> {
    let mut file = open_read(temp, CopyFailure::mismatch)?;
    let mut hasher = ContentHasher::new(algorithm);
    let mut buffer = vec![0u8; ctx.settings.chunk_size.get()];
    let mut done = 0u64;
    ctx.report(CopyPhase::Verifying, 0);

    loop {
        ctx.check_cancelled(PHASE)?;
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_failure(temp, done, &e)),
        };
        hasher.update(&buffer[..n]);
        done += n as u64;
        ctx.report(CopyPhase::Verifying, done);
    }

    if done != ctx.length {
        return Err(CopyFailure::mismatch(format!(
            "{} has {} bytes, expected {}",
            temp.display(),
            done,
            ctx.length
        )));
    }
    Ok(hasher.finalize())
}

/// Compare the copy-time digest with the verify-time digest
pub(crate) fn compare_digests(
    copied: &ContentDigest,
    verified: &ContentDigest,
    temp: &Path,
) -> Result<(), CopyFailure> {
    if copied == verified {
        debug!("Digest compare passed for {} ({})", temp.display(), verified);
        Ok(())
    } else {
        Err(CopyFailure::mismatch(format!(
            "digest of {} is {}, source digest was {}",
            temp.display(),
            verified,
            copied
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::EngineSettings;
    use tempfile::TempDir;
    use vericp_types::{BufferSize, CancellationToken, NoProgress, OperationId, WindowSize};

    fn settings() -> EngineSettings {
        EngineSettings::default().with_io_units(
            WindowSize::new(WindowSize::GRANULARITY).unwrap(),
            BufferSize::new(BufferSize::MIN).unwrap(),
        )
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    #[test]
    fn test_first_difference() {
        assert_eq!(first_difference(b"abc", b"abc"), None);
        assert_eq!(first_difference(b"abc", b"abd"), Some(2));
        assert_eq!(first_difference(b"abc", b"ab"), Some(2));
    }

    #[test]
    fn test_window_compare_finds_difference_in_later_window() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("src.bin");
        let copy = temp_dir.path().join("copy.bin");
        let data = pattern(WindowSize::GRANULARITY as usize * 3 + 17);
        std::fs::write(&source, &data).unwrap();
        let mut corrupted = data.clone();
        let flip = WindowSize::GRANULARITY as usize * 2 + 5;
        corrupted[flip] ^= 0xFF;
        std::fs::write(&copy, &corrupted).unwrap();

        let settings = settings();
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(
            OperationId::nil(),
            &settings,
            data.len() as u64,
            &NoProgress,
            &cancel,
        );

        let failure = window_compare(&ctx, &source, &copy).unwrap_err();
        assert_eq!(failure.kind, vericp_types::FailureKind::VerificationMismatch);
        assert!(failure.message.contains(&format!("byte {}", flip)));

        std::fs::write(&copy, &data).unwrap();
        window_compare(&ctx, &source, &copy).unwrap();
    }

    #[test]
    fn test_buffered_compare_matches_mapped_result() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("src.bin");
        let copy = temp_dir.path().join("copy.bin");
        let data = pattern(10_000);
        std::fs::write(&source, &data).unwrap();
        let mut corrupted = data.clone();
        corrupted[9_000] = corrupted[9_000].wrapping_add(1);
        std::fs::write(&copy, &corrupted).unwrap();

        let settings = settings();
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(OperationId::nil(), &settings, 10_000, &NoProgress, &cancel);
        let source_file = File::open(&source).unwrap();
        let copy_file = File::open(&copy).unwrap();

        let position = buffered_compare(
            &ctx,
            (&source_file, &source),
            (&copy_file, &copy),
            0,
            10_000,
        )
        .unwrap();
        assert_eq!(position, Some(9_000));
    }

    #[test]
    fn test_digests_agree_between_passes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        let data = pattern(WindowSize::GRANULARITY as usize + 1234);
        std::fs::write(&path, &data).unwrap();

        let settings = settings();
        let cancel = CancellationToken::new();
        let ctx = RunContext::new(
            OperationId::nil(),
            &settings,
            data.len() as u64,
            &NoProgress,
            &cancel,
        );

        let algorithm = vericp_io::select_algorithm(settings.digest);
        let mapped = digest_mapped(&ctx, &path, algorithm).unwrap();
        let buffered = digest_buffered(&ctx, &path, algorithm).unwrap();
        compare_digests(&mapped, &buffered, &path).unwrap();
    }

    #[test]
    fn test_verify_observes_cancellation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        std::fs::write(&path, pattern(100)).unwrap();

        let settings = settings();
        let cancel = CancellationToken::new();
        vericp_types::Cancellable::cancel(&cancel);
        let ctx = RunContext::new(OperationId::nil(), &settings, 100, &NoProgress, &cancel);

        let failure = digest_buffered(&ctx, &path, DigestAlgorithm::Sha256).unwrap_err();
        assert_eq!(failure.kind, vericp_types::FailureKind::Cancelled);
    }
}
