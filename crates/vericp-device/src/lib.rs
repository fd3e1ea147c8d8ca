//! Storage location classification and volume queries for vericp
//!
//! This crate answers the three questions the copy engine asks about the
//! filesystem before it touches any file:
//!
//! - **Where is this path?** [`VolumeClassifier`] maps a path to a
//!   [`LocationClass`](vericp_types::LocationClass) (local fixed, removable,
//!   mapped network share, or unresolvable)
//! - **Is there room?** [`available_space`] reports the bytes available to an
//!   unprivileged writer on the volume holding a path
//! - **Can we rename across these two paths?** [`same_volume`] tells whether
//!   two existing paths live on one volume
//!
//! # Examples
//!
//! ```rust,no_run
//! use vericp_device::VolumeClassifier;
//! use vericp_types::{LocationClass, LocationClassifier};
//!
//! let classifier = VolumeClassifier::new();
//! assert_eq!(
//!     classifier.classify(std::path::Path::new("//server/share/file")),
//!     LocationClass::Unresolvable
//! );
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod classifier;
pub mod space;

#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub mod unix;

// Re-export main types
pub use classifier::{is_unc_syntax, nearest_existing_ancestor, VolumeClassifier};
pub use space::{available_space, same_volume};
