//! Temp file pre-allocation

use std::fs::File;
use std::path::Path;
use tracing::debug;
use vericp_types::{Error, Result};

/// Size `file` to exactly `len` bytes before any data is written.
///
/// On Linux the blocks are reserved with `posix_fallocate`, so a full disk is
/// reported here rather than as a fault while writing a mapped window.
/// Filesystems that do not support reservation fall back to `set_len`.
pub fn preallocate(file: &File, path: &Path, len: u64) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        if len > 0 {
            let Ok(signed_len) = libc::off_t::try_from(len) else {
                return Err(Error::io(format!(
                    "Cannot preallocate {} bytes for {}",
                    len,
                    path.display()
                )));
            };
            // SAFETY: the descriptor is valid for the duration of the call.
            let code = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, signed_len) };
            match code {
                0 => {
                    debug!("Reserved {} bytes for {}", len, path.display());
                    return Ok(());
                }
                libc::EOPNOTSUPP | libc::EINVAL => {
                    debug!(
                        "posix_fallocate unsupported for {}, using set_len",
                        path.display()
                    );
                }
                code => {
                    return Err(Error::with_path(
                        "preallocate",
                        path,
                        &std::io::Error::from_raw_os_error(code),
                    ));
                }
            }
        }
    }

    file.set_len(len)
        .map_err(|e| Error::with_path("preallocate", path, &e))?;
    debug!("Sized {} to {} bytes", path.display(), len);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    #[test]
    fn test_preallocate_sets_exact_length() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prealloc.bin");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .unwrap();

        preallocate(&file, &path, 1_000_003).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 1_000_003);

        preallocate(&file, &path, 0).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 0);
    }
}
