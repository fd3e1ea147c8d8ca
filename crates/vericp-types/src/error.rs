//! Error types and handling for vericp
//!
//! Two layers live here. [`Error`] is the workspace error returned by the
//! building blocks (device probing, mapped I/O, configuration). [`CopyFailure`]
//! is the per-file classification carried by a finished
//! [`CopyOperationResult`](crate::CopyOperationResult): every building-block
//! error that reaches the copy state machine is folded into one of the six
//! [`FailureKind`]s before it is reported.

use std::fmt;
use std::path::PathBuf;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Low severity - operation can continue
    Low,
    /// Medium severity - operation should be retried by the caller
    Medium,
    /// High severity - operation should be aborted
    High,
}

/// Main error type for vericp building blocks
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// File not found
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found
        path: PathBuf,
    },

    /// Permission denied
    #[error("Permission denied: {path}")]
    PermissionDenied {
        /// Path to the file with permission issues
        path: PathBuf,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Location or volume probing failed
    #[error("Device detection error: {message}")]
    DeviceDetection {
        /// Error message describing the device detection issue
        message: String,
    },

    /// A memory mapping could not be created
    #[error("Memory mapping failed for '{path}' at offset {offset}: {message}")]
    Mapping {
        /// File being mapped
        path: PathBuf,
        /// Offset of the window that failed
        offset: u64,
        /// Underlying error message
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O related errors
    Io,
    /// Configuration errors
    Config,
    /// Device detection errors
    DeviceDetection,
    /// Memory mapping errors
    Mapping,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::FileNotFound { .. } | Self::PermissionDenied { .. } => {
                ErrorKind::Io
            }
            Self::Config { .. } => ErrorKind::Config,
            Self::DeviceDetection { .. } => ErrorKind::DeviceDetection,
            Self::Mapping { .. } => ErrorKind::Mapping,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Io { .. } | Self::Mapping { .. } => ErrorSeverity::Medium,
            Self::FileNotFound { .. } | Self::PermissionDenied { .. } => ErrorSeverity::High,
            Self::Config { .. } => ErrorSeverity::High,
            Self::DeviceDetection { .. } => ErrorSeverity::Low,
            Self::Other { .. } => ErrorSeverity::Medium,
        }
    }

    /// Check if this error is recoverable by a caller-driven retry.
    ///
    /// The engine itself never retries; this only informs batch callers.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { message } => {
                message.contains("Interrupted")
                    || message.contains("WouldBlock")
                    || message.contains("timed out")
            }
            Self::DeviceDetection { .. } | Self::Mapping { .. } | Self::Other { .. } => true,
            Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::Config { .. } => false,
        }
    }

    /// Create a new I/O error from a message
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new device detection error
    pub fn device_detection<S: Into<String>>(message: S) -> Self {
        Self::DeviceDetection {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Wrap an I/O error with the path and the action that failed
    pub fn with_path(action: &str, path: &std::path::Path, error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Self::Io {
                message: format!("{} '{}': {}", action, path.display(), error),
            },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

/// Classification of a failed or cancelled copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FailureKind {
    /// Unresolvable path, oversize file, insufficient space, or a request that
    /// cannot be staged. Nothing on disk was changed.
    PreflightRejected,
    /// The DIRECT_LARGE temp file could not be sized; no data was written.
    PreallocationFailed,
    /// A window or chunk could not be mapped, read, or written.
    CopyWriteFailed,
    /// The cancellation signal was observed during copy or verify.
    Cancelled,
    /// The temp file does not match the source.
    VerificationMismatch,
    /// The final rename or timestamp re-application failed.
    FinalizeFailed,
}

impl FailureKind {
    /// Whether the UI should present this as an error (cancellation is not one).
    pub fn is_error(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Stable snake_case name used in status records
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreflightRejected => "preflight_rejected",
            Self::PreallocationFailed => "preallocation_failed",
            Self::CopyWriteFailed => "copy_write_failed",
            Self::Cancelled => "cancelled",
            Self::VerificationMismatch => "verification_mismatch",
            Self::FinalizeFailed => "finalize_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PreflightRejected => "preflight rejected",
            Self::PreallocationFailed => "preallocation failed",
            Self::CopyWriteFailed => "copy write failed",
            Self::Cancelled => "cancelled",
            Self::VerificationMismatch => "verification mismatch",
            Self::FinalizeFailed => "finalize failed",
        };
        f.write_str(text)
    }
}

/// A classified copy failure with its human-readable message.
///
/// When rollback itself fails, `restore_error` carries that second error so
/// neither one masks the other.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CopyFailure {
    /// Failure classification
    pub kind: FailureKind,
    /// What went wrong
    pub message: String,
    /// Error raised while restoring the backup, if the restore also failed
    pub restore_error: Option<String>,
}

impl CopyFailure {
    /// Create a failure of the given kind
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            restore_error: None,
        }
    }

    /// Shorthand for [`FailureKind::PreflightRejected`]
    pub fn preflight(message: impl Into<String>) -> Self {
        Self::new(FailureKind::PreflightRejected, message)
    }

    /// Shorthand for [`FailureKind::CopyWriteFailed`]
    pub fn write(message: impl Into<String>) -> Self {
        Self::new(FailureKind::CopyWriteFailed, message)
    }

    /// Shorthand for [`FailureKind::VerificationMismatch`]
    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::new(FailureKind::VerificationMismatch, message)
    }

    /// Shorthand for [`FailureKind::Cancelled`]
    pub fn cancelled(phase: &str) -> Self {
        Self::new(FailureKind::Cancelled, format!("cancelled during {}", phase))
    }

    /// Attach the error raised by a failed rollback
    pub fn with_restore_error(mut self, restore_error: impl Into<String>) -> Self {
        self.restore_error = Some(restore_error.into());
        self
    }
}

impl fmt::Display for CopyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(restore) = &self.restore_error {
            write!(f, " (restore also failed: {})", restore)?;
        }
        Ok(())
    }
}

impl std::error::Error for CopyFailure {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_error_kind_consistency(message in ".*") {
            let errors = vec![
                (Error::Io { message: message.clone() }, ErrorKind::Io),
                (Error::Config { message: message.clone() }, ErrorKind::Config),
                (Error::DeviceDetection { message: message.clone() }, ErrorKind::DeviceDetection),
                (Error::Other { message: message.clone() }, ErrorKind::Other),
                (
                    Error::Mapping { path: PathBuf::from("f"), offset: 0, message: message.clone() },
                    ErrorKind::Mapping,
                ),
            ];

            for (error, expected) in errors {
                prop_assert_eq!(error.kind(), expected);
            }
        }

        #[test]
        fn test_failure_display_mentions_both_errors(
            message in "[a-z ]{1,40}",
            restore in "[a-z ]{1,40}"
        ) {
            let failure = CopyFailure::new(FailureKind::FinalizeFailed, message.clone())
                .with_restore_error(restore.clone());
            let text = failure.to_string();
            prop_assert!(text.contains(&message));
            prop_assert!(text.contains(&restore));
        }
    }

    #[test]
    fn test_cancellation_is_reported_as_copy_failure() {
        let failure = CopyFailure::cancelled("verify");
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert!(!failure.kind.is_error());
        assert!(failure.message.contains("verify"));
    }

    #[test]
    fn test_error_severity_ordering() {
        assert!(ErrorSeverity::Low < ErrorSeverity::Medium);
        assert!(ErrorSeverity::Medium < ErrorSeverity::High);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let error = Error::from(io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert_eq!(error.severity(), ErrorSeverity::Medium);
        assert!(error.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_with_path_maps_not_found() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error = Error::with_path("open", std::path::Path::new("/nope"), &io_error);
        assert!(matches!(error, Error::FileNotFound { .. }));
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_cancelled_is_not_an_error_kind() {
        assert!(!FailureKind::Cancelled.is_error());
        assert!(FailureKind::VerificationMismatch.is_error());
        assert!(FailureKind::PreflightRejected.is_error());
    }

    #[test]
    fn test_failure_without_restore_error() {
        let failure = CopyFailure::mismatch("digest differs");
        assert_eq!(failure.to_string(), "verification mismatch: digest differs");
        assert!(failure.restore_error.is_none());
    }
}
