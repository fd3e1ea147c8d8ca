//! vericp integration testing support
//!
//! Shared fixtures for the integration tests in `tests/`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
///
/// Data generators, file helpers and collaborator test doubles used across
/// the integration tests.
pub mod test_utils;
