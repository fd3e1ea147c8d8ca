//! Verified copy engine for vericp
//!
//! This crate moves one file at a time from a source to a destination so
//! that the destination either ends up holding a verified copy or is left
//! exactly as it was.
//!
//! # Features
//!
//! - **Strategy selection**: DIRECT_SMALL, DIRECT_LARGE or STAGED, chosen from
//!   the endpoint storage classes and the file size
//! - **Verification**: windowed byte compare or copy-time/verify-time digest
//!   compare, skipped entirely when the policy says so
//! - **Atomic finalize**: the destination name is only written by one rename;
//!   a pre-existing destination is kept as a backup until the copy is proven
//! - **Rollback**: any failure or cancellation restores the backup with its
//!   original timestamps
//! - **Progress**: a bounded, drop-oldest channel drained by a polling monitor
//! - **Batches**: many files on the blocking pool, bounded by a semaphore
//!
//! # Examples
//!
//! ```rust,no_run
//! use vericp_engine::{CopyEngine, EngineSettings};
//! use vericp_types::{CancellationToken, CopyRequest, NoProgress};
//!
//! let engine = CopyEngine::new(EngineSettings::default());
//! let request = CopyRequest::new("report.pdf", "backup/report.pdf");
//! let result = engine.execute(&request, &NoProgress, &CancellationToken::new());
//! println!("{}: {} bytes", result.outcome, result.bytes_transferred);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod context;
mod direct_large;
mod direct_small;
pub mod engine;
pub mod finalize;
pub mod progress;
pub mod selector;
pub mod settings;
mod staged;
pub mod status;
mod verify;

pub use engine::{CopyEngine, EngineBuilder};
pub use finalize::{Artifacts, BACKUP_SUFFIX, TEMP_SUFFIX};
pub use progress::{ProgressMonitor, ProgressSender};
pub use selector::{needs_hasher, select_strategy, select_verification, Selection};
pub use settings::{EngineSettings, StrategyThresholds};
pub use status::{FanoutStatusSink, JsonLinesStatusSink, TracingStatusSink};
