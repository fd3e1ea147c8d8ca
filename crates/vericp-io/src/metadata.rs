//! Source file inspection

use std::fs::Metadata;

/// Whether a file occupies fewer blocks than its length implies.
///
/// Sparse layout is not preserved by any copy strategy; the copy is
/// content-identical but fully allocated.
#[cfg(unix)]
pub fn is_sparse(metadata: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    metadata.is_file() && metadata.blocks().saturating_mul(512) < metadata.len()
}

/// Whether a file carries the sparse attribute
#[cfg(windows)]
pub fn is_sparse(metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    use winapi::um::winnt::FILE_ATTRIBUTE_SPARSE_FILE;
    metadata.file_attributes() & FILE_ATTRIBUTE_SPARSE_FILE != 0
}

/// Sparse detection is unavailable on this platform
#[cfg(not(any(unix, windows)))]
pub fn is_sparse(_metadata: &Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dense_file_is_not_sparse() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dense.bin");
        std::fs::write(&path, vec![7u8; 64 * 1024]).unwrap();
        assert!(!is_sparse(&std::fs::metadata(&path).unwrap()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_hole_is_sparse_where_supported() {
        use std::os::unix::fs::MetadataExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("holey.bin");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(64 * 1024 * 1024).unwrap();
        drop(file);

        let metadata = std::fs::metadata(&path).unwrap();
        // Most filesystems leave the hole unallocated
        if metadata.blocks() == 0 {
            assert!(is_sparse(&metadata));
        }
    }
}
