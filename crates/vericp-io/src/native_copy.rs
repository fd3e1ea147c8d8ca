//! Native whole-file copy with a progress and cancellation callback
//!
//! Linux uses `copy_file_range` in bounded slices so the callback runs
//! between slices; Windows hands the whole copy to `CopyFileExW` and its
//! progress routine. Everything else, and any filesystem that refuses the
//! native call, goes through a buffered loop.
//!
//! The callback receives `(bytes_done, bytes_total)` and returns `false` to
//! abort. The target is created exclusively; an existing target is an error.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::debug;
use vericp_types::{Error, Result};

/// How a native copy ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCopyOutcome {
    /// Every byte was copied and synced
    Completed(u64),
    /// The callback asked to stop after this many bytes
    Cancelled(u64),
}

/// Copy `source` to a new file at `target`.
///
/// `slice_size` bounds how much is copied between two callback invocations
/// where the platform allows it.
pub fn copy_file_native(
    source: &Path,
    target: &Path,
    slice_size: usize,
    progress: &mut dyn FnMut(u64, u64) -> bool,
) -> Result<NativeCopyOutcome> {
    debug!(
        "Native copy {} -> {} (slice {} bytes)",
        source.display(),
        target.display(),
        slice_size
    );
    platform_copy(source, target, slice_size.max(1), progress)
}

#[cfg_attr(windows, allow(dead_code))]
fn open_pair(source: &Path, target: &Path) -> Result<(File, File, u64)> {
    let src = File::open(source).map_err(|e| Error::with_path("open", source, &e))?;
    let total = src
        .metadata()
        .map_err(|e| Error::with_path("stat", source, &e))?
        .len();
    let dst = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .map_err(|e| Error::with_path("create", target, &e))?;
    Ok((src, dst, total))
}

fn finish(dst: &File, target: &Path, copied: u64) -> Result<NativeCopyOutcome> {
    dst.sync_all()
        .map_err(|e| Error::with_path("sync", target, &e))?;
    Ok(NativeCopyOutcome::Completed(copied))
}

/// Buffered loop from the current offsets of both files
#[cfg_attr(windows, allow(dead_code))]
fn buffered_copy(
    src: &mut File,
    dst: &mut File,
    target: &Path,
    slice_size: usize,
    mut copied: u64,
    total: u64,
    progress: &mut dyn FnMut(u64, u64) -> bool,
) -> Result<NativeCopyOutcome> {
    let mut buffer = vec![0u8; slice_size];
    loop {
        if !progress(copied, total) {
            return Ok(NativeCopyOutcome::Cancelled(copied));
        }
        let n = match src.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io(format!("Read failed: {}", e))),
        };
        dst.write_all(&buffer[..n])
            .map_err(|e| Error::with_path("write", target, &e))?;
        copied += n as u64;
    }
    progress(copied, total);
    finish(dst, target, copied)
}

#[cfg(target_os = "linux")]
fn platform_copy(
    source: &Path,
    target: &Path,
    slice_size: usize,
    progress: &mut dyn FnMut(u64, u64) -> bool,
) -> Result<NativeCopyOutcome> {
    use std::os::unix::io::AsRawFd;

    let (mut src, mut dst, total) = open_pair(source, target)?;
    let mut copied = 0u64;

    loop {
        if !progress(copied, total) {
            return Ok(NativeCopyOutcome::Cancelled(copied));
        }

        // SAFETY: both descriptors are open for the duration of the call and
        // null offsets make the kernel use and advance the file positions.
        let result = unsafe {
            libc::copy_file_range(
                src.as_raw_fd(),
                std::ptr::null_mut(),
                dst.as_raw_fd(),
                std::ptr::null_mut(),
                slice_size,
                0,
            )
        };

        if result < 0 {
            let error = io::Error::last_os_error();
            match error.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EXDEV | libc::ENOSYS | libc::EOPNOTSUPP | libc::EINVAL) => {
                    debug!(
                        "copy_file_range unavailable ({}), continuing with buffered copy",
                        error
                    );
                    return buffered_copy(
                        &mut src, &mut dst, target, slice_size, copied, total, progress,
                    );
                }
                _ => return Err(Error::with_path("copy to", target, &error)),
            }
        }

        if result == 0 {
            break;
        }
        copied += result as u64;
    }

    progress(copied, total);
    finish(&dst, target, copied)
}

#[cfg(windows)]
fn platform_copy(
    source: &Path,
    target: &Path,
    _slice_size: usize,
    progress: &mut dyn FnMut(u64, u64) -> bool,
) -> Result<NativeCopyOutcome> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use winapi::shared::minwindef::{DWORD, FALSE, LPVOID};
    use winapi::shared::ntdef::LARGE_INTEGER;
    use winapi::shared::winerror::ERROR_REQUEST_ABORTED;
    use winapi::um::winbase::{
        CopyFileExW, COPY_FILE_FAIL_IF_EXISTS, PROGRESS_CANCEL, PROGRESS_CONTINUE,
    };
    use winapi::um::winnt::HANDLE;

    struct CallbackState<'a> {
        progress: &'a mut dyn FnMut(u64, u64) -> bool,
        copied: u64,
    }

    unsafe extern "system" fn progress_routine(
        total_file_size: LARGE_INTEGER,
        total_bytes_transferred: LARGE_INTEGER,
        _stream_size: LARGE_INTEGER,
        _stream_bytes_transferred: LARGE_INTEGER,
        _stream_number: DWORD,
        _callback_reason: DWORD,
        _source_file: HANDLE,
        _destination_file: HANDLE,
        data: LPVOID,
    ) -> DWORD {
        let state = &mut *data.cast::<CallbackState<'_>>();
        let total = *total_file_size.QuadPart() as u64;
        let done = *total_bytes_transferred.QuadPart() as u64;
        state.copied = done;
        if (state.progress)(done, total) {
            PROGRESS_CONTINUE
        } else {
            PROGRESS_CANCEL
        }
    }

    let wide = |path: &Path| -> Vec<u16> {
        OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    };
    let source_wide = wide(source);
    let target_wide = wide(target);

    if !progress(0, 0) {
        return Ok(NativeCopyOutcome::Cancelled(0));
    }

    let mut state = CallbackState {
        progress,
        copied: 0,
    };

    // SAFETY: the path buffers are NUL-terminated and outlive the call; the
    // state pointer is only dereferenced by the routine during the call.
    let result = unsafe {
        CopyFileExW(
            source_wide.as_ptr(),
            target_wide.as_ptr(),
            Some(progress_routine),
            (&mut state as *mut CallbackState<'_>).cast(),
            std::ptr::null_mut(),
            COPY_FILE_FAIL_IF_EXISTS,
        )
    };

    if result == FALSE {
        let error = io::Error::last_os_error();
        if error.raw_os_error() == Some(ERROR_REQUEST_ABORTED as i32) {
            return Ok(NativeCopyOutcome::Cancelled(state.copied));
        }
        return Err(Error::with_path("copy to", target, &error));
    }

    let dst = OpenOptions::new()
        .write(true)
        .open(target)
        .map_err(|e| Error::with_path("open", target, &e))?;
    let copied = dst
        .metadata()
        .map_err(|e| Error::with_path("stat", target, &e))?
        .len();
    finish(&dst, target, copied)
}

#[cfg(not(any(target_os = "linux", windows)))]
fn platform_copy(
    source: &Path,
    target: &Path,
    slice_size: usize,
    progress: &mut dyn FnMut(u64, u64) -> bool,
) -> Result<NativeCopyOutcome> {
    let (mut src, mut dst, total) = open_pair(source, target)?;
    buffered_copy(&mut src, &mut dst, target, slice_size, 0, total, progress)
}
