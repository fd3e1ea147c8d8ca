//! Windows location classification and volume queries
//!
//! Drive-letter paths are classified with `GetDriveTypeW`. UNC syntax typed by
//! the caller never reaches this module because it is rejected before
//! resolution. A mapped drive, however, canonicalizes to `\\?\UNC\server\share`,
//! so the drive letter of the path as given decides in that case.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf, Prefix};
use std::ptr;
use tracing::debug;
use vericp_types::{Error, LocationClass, Result};
use winapi::shared::minwindef::{DWORD, FALSE};
use winapi::shared::ntdef::ULARGE_INTEGER;
use winapi::um::fileapi::{GetDiskFreeSpaceExW, GetDriveTypeW, GetVolumePathNameW};
use winapi::um::winbase::{DRIVE_CDROM, DRIVE_FIXED, DRIVE_RAMDISK, DRIVE_REMOTE, DRIVE_REMOVABLE};

fn to_wide(value: &OsStr) -> Vec<u16> {
    value.encode_wide().chain(std::iter::once(0)).collect()
}

/// Drive root (`C:\`) of a resolved path, if it has a drive letter
fn drive_root(path: &Path) -> Option<String> {
    match path.components().next() {
        Some(Component::Prefix(prefix)) => match prefix.kind() {
            Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => {
                Some(format!("{}:\\", char::from(letter)))
            }
            _ => None,
        },
        _ => None,
    }
}

/// What decides the class of a path once it has been resolved
#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    /// Query the drive type of this root
    Drive(String),
    /// A drive-letter path that resolved onto a share (a mapped drive, or a
    /// link on a local drive pointing at a share)
    MappedShare,
    /// Neither a drive letter nor a share reached through one
    Unresolvable,
}

fn is_share(path: &Path) -> bool {
    matches!(
        path.components().next(),
        Some(Component::Prefix(prefix))
            if matches!(prefix.kind(), Prefix::UNC(..) | Prefix::VerbatimUNC(..))
    )
}

fn resolution(given: &Path, resolved: &Path) -> Resolution {
    if let Some(root) = drive_root(resolved) {
        return Resolution::Drive(root);
    }
    if is_share(resolved) && drive_root(given).is_some() {
        return Resolution::MappedShare;
    }
    Resolution::Unresolvable
}

/// Classify `given` (absolute, as the caller wrote it) from its resolved form
pub fn classify(given: &Path, resolved: &Path) -> LocationClass {
    let root = match resolution(given, resolved) {
        Resolution::Drive(root) => root,
        Resolution::MappedShare => {
            debug!(
                "{} resolves onto share {}",
                given.display(),
                resolved.display()
            );
            return LocationClass::NetworkMapped;
        }
        Resolution::Unresolvable => {
            debug!("No drive letter in {}", resolved.display());
            return LocationClass::Unresolvable;
        }
    };

    let root_wide = to_wide(OsStr::new(&root));
    let drive_type = unsafe { GetDriveTypeW(root_wide.as_ptr()) };

    match drive_type {
        DRIVE_FIXED | DRIVE_RAMDISK => LocationClass::LocalFixed,
        DRIVE_REMOVABLE | DRIVE_CDROM => LocationClass::LocalRemovable,
        DRIVE_REMOTE => LocationClass::NetworkMapped,
        other => {
            debug!("Drive {} has unknown type {}", root, other);
            LocationClass::Unresolvable
        }
    }
}

/// Bytes available to the calling user, via `GetDiskFreeSpaceExW`
pub fn available_space(path: &Path) -> Result<u64> {
    let path_wide = to_wide(path.as_os_str());
    let mut free_to_caller: ULARGE_INTEGER = unsafe { std::mem::zeroed() };

    let result = unsafe {
        GetDiskFreeSpaceExW(
            path_wide.as_ptr(),
            &mut free_to_caller,
            ptr::null_mut(),
            ptr::null_mut(),
        )
    };

    if result == FALSE {
        return Err(Error::device_detection(format!(
            "Failed to get free space for {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }

    Ok(unsafe { *free_to_caller.QuadPart() })
}

/// Mount point of the volume holding `path`
fn volume_path(path: &Path) -> Result<PathBuf> {
    let path_wide = to_wide(path.as_os_str());
    let mut buffer = vec![0u16; 1024];

    let result = unsafe {
        GetVolumePathNameW(path_wide.as_ptr(), buffer.as_mut_ptr(), buffer.len() as DWORD)
    };

    if result == FALSE {
        return Err(Error::device_detection(format!(
            "Failed to get volume path for {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }

    let len = buffer.iter().position(|c| *c == 0).unwrap_or(buffer.len());
    Ok(PathBuf::from(String::from_utf16_lossy(&buffer[..len])))
}

/// Compare the volume mount points of two existing paths
pub fn same_volume(a: &Path, b: &Path) -> Result<bool> {
    let resolve = |path: &Path| {
        std::fs::canonicalize(path).map_err(|e| Error::with_path("resolve", path, &e))
    };
    let a = volume_path(&resolve(a)?)?;
    let b = volume_path(&resolve(b)?)?;
    Ok(a.to_string_lossy().eq_ignore_ascii_case(&b.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_root() {
        assert_eq!(drive_root(Path::new(r"C:\Users\a")), Some(r"C:\".to_string()));
        assert_eq!(
            drive_root(Path::new(r"\\?\D:\data")),
            Some(r"D:\".to_string())
        );
        assert_eq!(drive_root(Path::new(r"\\server\share\x")), None);
    }

    #[test]
    fn test_mapped_drive_resolving_to_share() {
        assert_eq!(
            resolution(
                Path::new(r"Z:\dir\f.bin"),
                Path::new(r"\\?\UNC\server\share\dir\f.bin")
            ),
            Resolution::MappedShare
        );
        assert_eq!(
            classify(
                Path::new(r"Z:\dir\f.bin"),
                Path::new(r"\\?\UNC\server\share\dir\f.bin")
            ),
            LocationClass::NetworkMapped
        );
    }

    #[test]
    fn test_resolution_prefers_resolved_drive() {
        assert_eq!(
            resolution(Path::new(r"C:\link"), Path::new(r"\\?\D:\target")),
            Resolution::Drive(r"D:\".to_string())
        );
        assert_eq!(
            resolution(
                Path::new(r"\\server\share\x"),
                Path::new(r"\\?\UNC\server\share\x")
            ),
            Resolution::Unresolvable
        );
    }

    #[test]
    fn test_current_dir_is_local() {
        let current_dir = std::env::current_dir().unwrap();
        let resolved = std::fs::canonicalize(&current_dir).unwrap();
        assert_ne!(classify(&current_dir, &resolved), LocationClass::Unresolvable);
    }
}
