//! Free space and volume identity queries

use crate::classifier::nearest_existing_ancestor;
use std::path::Path;
use vericp_types::{Error, Result};

/// Bytes available to an unprivileged writer on the volume holding `path`.
///
/// A path that does not exist yet is measured at its nearest existing
/// ancestor.
pub fn available_space(path: &Path) -> Result<u64> {
    let resolved = nearest_existing_ancestor(path).ok_or_else(|| {
        Error::device_detection(format!("Cannot resolve volume for {}", path.display()))
    })?;
    platform_available_space(&resolved)
}

/// Whether two existing paths live on the same volume
pub fn same_volume(a: &Path, b: &Path) -> Result<bool> {
    platform_same_volume(a, b)
}

#[cfg(unix)]
fn platform_available_space(path: &Path) -> Result<u64> {
    crate::unix::available_space(path)
}

#[cfg(windows)]
fn platform_available_space(path: &Path) -> Result<u64> {
    crate::windows::available_space(path)
}

#[cfg(not(any(unix, windows)))]
fn platform_available_space(_path: &Path) -> Result<u64> {
    Err(Error::device_detection(
        "Free space query is not supported on this platform",
    ))
}

#[cfg(unix)]
fn platform_same_volume(a: &Path, b: &Path) -> Result<bool> {
    crate::unix::same_volume(a, b)
}

#[cfg(windows)]
fn platform_same_volume(a: &Path, b: &Path) -> Result<bool> {
    crate::windows::same_volume(a, b)
}

#[cfg(not(any(unix, windows)))]
fn platform_same_volume(_a: &Path, _b: &Path) -> Result<bool> {
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_available_space_for_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("not-yet-written.bin");
        let space = available_space(&missing).unwrap();
        assert!(space > 0);
    }

    #[test]
    fn test_file_and_parent_share_volume() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.bin");
        std::fs::write(&file, b"data").unwrap();
        assert!(same_volume(&file, temp_dir.path()).unwrap());
    }

    #[test]
    fn test_same_volume_missing_path_errors() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        assert!(same_volume(&missing, temp_dir.path()).is_err());
    }
}
