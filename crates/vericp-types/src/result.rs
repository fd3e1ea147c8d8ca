//! Result type alias for vericp operations

use crate::Error;

/// Result type alias for vericp operations
pub type Result<T> = std::result::Result<T, Error>;
