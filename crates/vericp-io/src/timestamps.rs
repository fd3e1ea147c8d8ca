//! Timestamp accessor backed by `filetime`
//!
//! Modification time is applied everywhere. Creation time is applied on
//! Windows through `SetFileTime`; Unix filesystems do not allow setting a
//! birth time, so it is read where available and otherwise ignored.

use filetime::FileTime;
use std::path::Path;
use tracing::warn;
use vericp_types::{Error, FileTimes, Result, TimestampAccessor};

/// Filesystem timestamp accessor
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTimeAccessor;

impl FileTimeAccessor {
    /// Create a new accessor
    pub fn new() -> Self {
        Self
    }
}

impl TimestampAccessor for FileTimeAccessor {
    fn get_times(&self, path: &Path) -> Result<FileTimes> {
        let metadata = std::fs::metadata(path).map_err(|e| Error::with_path("stat", path, &e))?;
        let modified = metadata
            .modified()
            .map_err(|e| Error::with_path("read modification time of", path, &e))?;
        Ok(FileTimes {
            created: metadata.created().ok(),
            modified,
        })
    }

    fn set_times(&self, path: &Path, times: &FileTimes) -> bool {
        let modified = FileTime::from_system_time(times.modified);
        if let Err(e) = filetime::set_file_mtime(path, modified) {
            warn!(
                "Failed to set modification time of {}: {}",
                path.display(),
                e
            );
            return false;
        }

        match times.created {
            Some(created) => set_creation_time(path, FileTime::from_system_time(created)),
            None => true,
        }
    }
}

#[cfg(windows)]
fn set_creation_time(path: &Path, created: FileTime) -> bool {
    use std::os::windows::io::AsRawHandle;
    use winapi::shared::minwindef::{FALSE, FILETIME};
    use winapi::um::fileapi::SetFileTime;

    let file = match std::fs::OpenOptions::new().write(true).open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!("Failed to open {} to set creation time: {}", path.display(), e);
            return false;
        }
    };

    // filetime reports Windows times as seconds since 1601-01-01
    let intervals = (created.seconds() as u64)
        .saturating_mul(10_000_000)
        .saturating_add(u64::from(created.nanoseconds()) / 100);
    let creation = FILETIME {
        dwLowDateTime: intervals as u32,
        dwHighDateTime: (intervals >> 32) as u32,
    };

    // SAFETY: the handle is valid while `file` is alive; null pointers leave
    // access and write times untouched.
    let result = unsafe {
        SetFileTime(
            file.as_raw_handle().cast(),
            &creation,
            std::ptr::null(),
            std::ptr::null(),
        )
    };
    if result == FALSE {
        warn!(
            "Failed to set creation time of {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        );
        return false;
    }
    true
}

#[cfg(not(windows))]
fn set_creation_time(_path: &Path, _created: FileTime) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_modified_time() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("file.txt");
        std::fs::write(&path, b"x").unwrap();

        let accessor = FileTimeAccessor::new();
        let wanted = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        assert!(accessor.set_times(
            &path,
            &FileTimes {
                created: None,
                modified: wanted,
            }
        ));

        let times = accessor.get_times(&path).unwrap();
        assert_eq!(times.modified, wanted);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.txt");
        let accessor = FileTimeAccessor::new();

        assert!(matches!(
            accessor.get_times(&path),
            Err(Error::FileNotFound { .. })
        ));
        assert!(!accessor.set_times(
            &path,
            &FileTimes {
                created: None,
                modified: SystemTime::now(),
            }
        ));
    }
}
