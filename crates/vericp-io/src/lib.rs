//! Memory-mapped windows, digests and native copy primitives for vericp
//!
//! The building blocks the copy engines are assembled from:
//!
//! - **Scoped mappings**: [`ReadWindow`] and [`WriteWindow`] map one window of
//!   a file and unmap it when dropped, on every exit path
//! - **Digests**: [`select_algorithm`] picks BLAKE3 when compiled in and
//!   SHA-256 otherwise; [`ContentHasher`] accumulates either
//! - **Native copy**: [`copy_file_native`] uses `copy_file_range` on Linux and
//!   `CopyFileExW` on Windows, with a progress/cancel callback
//! - **Pre-allocation**: [`preallocate`] sizes a temp file before any write
//! - **Timestamps**: [`FileTimeAccessor`] reads and applies creation and
//!   modification times
//!
//! # Features
//!
//! - `blake3` (default): Use BLAKE3 as the preferred digest

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod digest;
pub mod memory_map;
pub mod metadata;
pub mod native_copy;
pub mod prealloc;
pub mod timestamps;

// Re-export main types
pub use digest::{digest_reader, select_algorithm, ContentDigest, ContentHasher};
pub use memory_map::{ReadWindow, WriteWindow};
pub use metadata::is_sparse;
pub use native_copy::{copy_file_native, NativeCopyOutcome};
pub use prealloc::preallocate;
pub use timestamps::FileTimeAccessor;
