//! STAGED: chunked buffered copy with a progressive digest
//!
//! Used whenever a network or unresolvable endpoint is involved. Buffered
//! I/O only; a mapped page fault over a network transport would stall the
//! worker past any cancellation check.

use crate::context::{open_read, RunContext};
use crate::verify;
use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::debug;
use vericp_io::{ContentDigest, ContentHasher};
use vericp_types::{CopyFailure, CopyPhase, DigestAlgorithm};

const PHASE: &str = "copy";

/// Copy `source` into a new `temp` file chunk by chunk, returning the source
/// digest when `algorithm` is set
pub(crate) fn copy(
    ctx: &RunContext<'_>,
    source: &Path,
    temp: &Path,
    algorithm: Option<DigestAlgorithm>,
) -> Result<Option<ContentDigest>, CopyFailure> {
    ctx.check_cancelled(PHASE)?;
    let mut input = open_read(source, CopyFailure::write)?;
    let mut output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp)
        .map_err(|e| CopyFailure::write(format!("cannot create {}: {}", temp.display(), e)))?;

    let mut hasher = algorithm.map(ContentHasher::new);
    let mut buffer = vec![0u8; ctx.settings.chunk_size.get()];
    let mut done = 0u64;
    ctx.report(CopyPhase::Copying, 0);

    loop {
        let n = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(CopyFailure::write(format!(
                    "cannot read {} at offset {}: {}",
                    source.display(),
                    done,
                    e
                )))
            }
        };

        let chunk = &buffer[..n];
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(chunk);
        }
        output.write_all(chunk).map_err(|e| {
            CopyFailure::write(format!(
                "cannot write {} at offset {}: {}",
                temp.display(),
                done,
                e
            ))
        })?;

        done += n as u64;
        ctx.set_transferred(done);
        ctx.report(CopyPhase::Copying, done);
        ctx.check_cancelled(PHASE)?;
    }

    output
        .sync_all()
        .map_err(|e| CopyFailure::write(format!("cannot flush {}: {}", temp.display(), e)))?;
    debug!("Staged copy finished: {} bytes", done);
    Ok(hasher.map(ContentHasher::finalize))
}

/// Re-read the temp file and compare its digest with the copy-time digest
pub(crate) fn verify(
    ctx: &RunContext<'_>,
    temp: &Path,
    copied: &ContentDigest,
) -> Result<(), CopyFailure> {
    let verified = verify::digest_buffered(ctx, temp, copied.algorithm())?;
    verify::compare_digests(copied, &verified, temp)
}
