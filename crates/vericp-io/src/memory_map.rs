//! Scoped memory-mapped windows
//!
//! A window maps `len` bytes of a file starting at `offset`. The mapping is
//! released when the window is dropped, so a failed iteration can never leak
//! a mapping into the next one. Offsets must be multiples of the platform
//! allocation granularity; [`WindowSize`](vericp_types::WindowSize) guarantees
//! that for every window it produces.

use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::File;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use tracing::trace;
use vericp_types::{Error, Result};

fn mapping_error(path: &Path, offset: u64, error: &std::io::Error) -> Error {
    Error::Mapping {
        path: path.to_path_buf(),
        offset,
        message: error.to_string(),
    }
}

/// Read-only mapping of one window of a file
#[derive(Debug)]
pub struct ReadWindow {
    mmap: Mmap,
    offset: u64,
}

impl ReadWindow {
    /// Map `len` bytes of `file` at `offset`. `path` is used for errors only.
    pub fn map(file: &File, path: &Path, offset: u64, len: usize) -> Result<Self> {
        // SAFETY: the file is opened by the caller and held for the lifetime
        // of the mapping. Concurrent external truncation is a source mutation,
        // which the engine detects through its length re-check.
        let mmap = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len)
                .map(file)
                .map_err(|e| mapping_error(path, offset, &e))?
        };

        #[cfg(unix)]
        if let Err(e) = mmap.advise(memmap2::Advice::Sequential) {
            trace!("madvise failed for {}: {}", path.display(), e);
        }

        trace!(
            "Mapped read window of {} at offset {} ({} bytes)",
            path.display(),
            offset,
            len
        );
        Ok(Self { mmap, offset })
    }

    /// File offset of the first mapped byte
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Deref for ReadWindow {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.mmap
    }
}

/// Read-write mapping of one window of a file.
///
/// The file must be opened for reading and writing and already sized to
/// cover the window.
#[derive(Debug)]
pub struct WriteWindow {
    mmap: MmapMut,
    offset: u64,
}

impl WriteWindow {
    /// Map `len` bytes of `file` at `offset` for writing
    pub fn map(file: &File, path: &Path, offset: u64, len: usize) -> Result<Self> {
        // SAFETY: the temp file is owned exclusively by the running copy, so
        // no other process writes through this mapping.
        let mmap = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len)
                .map_mut(file)
                .map_err(|e| mapping_error(path, offset, &e))?
        };

        trace!(
            "Mapped write window of {} at offset {} ({} bytes)",
            path.display(),
            offset,
            len
        );
        Ok(Self { mmap, offset })
    }

    /// File offset of the first mapped byte
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Write dirty pages of this window back to the file, waiting for
    /// completion
    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| Error::io(format!("Failed to flush window at {}: {}", self.offset, e)))
    }
}

impl Deref for WriteWindow {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.mmap
    }
}

impl DerefMut for WriteWindow {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }
}
