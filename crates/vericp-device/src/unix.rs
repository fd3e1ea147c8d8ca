//! Unix location classification and volume queries
//!
//! Linux resolves the mount for a path from `/proc/mounts` (longest mount
//! point prefix wins) and checks `/sys/class/block` for removable media. The
//! BSDs and macOS ask `statfs` directly.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use vericp_types::{Error, LocationClass, Result};

/// Mount information for a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Device or remote source (e.g. `/dev/sda1`, `server:/export`)
    pub device: String,
    /// Mount point
    pub mount_point: PathBuf,
    /// Filesystem type
    pub fs_type: String,
}

impl MountInfo {
    /// Whether this mount is backed by a network filesystem
    pub fn is_network(&self) -> bool {
        is_network_filesystem(&self.fs_type)
    }
}

/// Check if a filesystem type is network-based
pub fn is_network_filesystem(fs_type: &str) -> bool {
    matches!(
        fs_type,
        "nfs"
            | "nfs4"
            | "cifs"
            | "smb"
            | "smb2"
            | "smb3"
            | "smbfs"
            | "afpfs"
            | "ftp"
            | "sftp"
            | "sshfs"
            | "fuse.sshfs"
            | "davfs"
            | "ceph"
            | "glusterfs"
            | "fuse.glusterfs"
            | "afs"
            | "lustre"
            | "webdav"
    )
}

/// Classify an already-resolved path
pub fn classify(path: &Path) -> LocationClass {
    let mount = match mount_info(path) {
        Ok(mount) => mount,
        Err(e) => {
            warn!("Cannot determine mount for {}: {}", path.display(), e);
            return LocationClass::Unresolvable;
        }
    };

    debug!(
        "Path {} is on {} ({}) mounted at {}",
        path.display(),
        mount.device,
        mount.fs_type,
        mount.mount_point.display()
    );

    if mount.is_network() {
        LocationClass::NetworkMapped
    } else if is_removable_device(&mount.device) {
        LocationClass::LocalRemovable
    } else {
        LocationClass::LocalFixed
    }
}

/// Find the mount holding `path`
#[cfg(target_os = "linux")]
pub fn mount_info(path: &Path) -> Result<MountInfo> {
    let content = std::fs::read_to_string("/proc/mounts")
        .map_err(|e| Error::device_detection(format!("Failed to read /proc/mounts: {}", e)))?;
    find_mount(&parse_mounts(&content), path)
        .ok_or_else(|| Error::device_detection("No mount point found for path"))
}

/// Find the mount holding `path`
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
pub fn mount_info(path: &Path) -> Result<MountInfo> {
    let c_path = c_path(path)?;
    let mut stats: libc::statfs = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::statfs(c_path.as_ptr(), &mut stats) };
    if result != 0 {
        return Err(Error::device_detection(format!(
            "statfs failed for {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }

    let text = |field: &[libc::c_char]| -> String {
        let bytes: Vec<u8> = field
            .iter()
            .take_while(|c| **c != 0)
            .map(|c| *c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    };

    Ok(MountInfo {
        device: text(&stats.f_mntfromname),
        mount_point: PathBuf::from(text(&stats.f_mntonname)),
        fs_type: text(&stats.f_fstypename),
    })
}

/// Find the mount holding `path`
#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
)))]
pub fn mount_info(_path: &Path) -> Result<MountInfo> {
    Err(Error::device_detection(
        "Mount lookup is not supported on this platform",
    ))
}

/// Parse the content of `/proc/mounts`
pub fn parse_mounts(content: &str) -> Vec<MountInfo> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let device = parts.next()?;
            let mount_point = parts.next()?;
            let fs_type = parts.next()?;
            Some(MountInfo {
                device: unescape_mount_field(device),
                mount_point: PathBuf::from(unescape_mount_field(mount_point)),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

/// Pick the mount with the longest mount point that contains `path`.
///
/// Later entries win ties, matching how the kernel stacks mounts.
pub fn find_mount(mounts: &[MountInfo], path: &Path) -> Option<MountInfo> {
    let mut best: Option<&MountInfo> = None;
    for mount in mounts {
        if !path.starts_with(&mount.mount_point) {
            continue;
        }
        let len = mount.mount_point.as_os_str().len();
        if best.map_or(true, |b| len >= b.mount_point.as_os_str().len()) {
            best = Some(mount);
        }
    }
    best.cloned()
}

/// `/proc/mounts` escapes space, tab, newline and backslash as `\ooo`
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                out.push(value as u8);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(target_os = "linux")]
fn is_removable_device(device: &str) -> bool {
    let Some(name) = device.strip_prefix("/dev/") else {
        return false;
    };
    let name = name.rsplit('/').next().unwrap_or(name);

    let Ok(mut sys_dir) = std::fs::canonicalize(Path::new("/sys/class/block").join(name)) else {
        return false;
    };
    // Partitions inherit the flag from their parent disk
    if sys_dir.join("partition").exists() {
        sys_dir.pop();
    }

    match std::fs::read_to_string(sys_dir.join("removable")) {
        Ok(content) => content.trim() == "1",
        Err(e) => {
            debug!("No removable flag for {}: {}", device, e);
            false
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn is_removable_device(_device: &str) -> bool {
    false
}

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| Error::device_detection(format!("Invalid path: {}", e)))
}

/// Bytes available to an unprivileged writer, via `statvfs`
#[allow(clippy::unnecessary_cast)]
pub fn available_space(path: &Path) -> Result<u64> {
    let c_path = c_path(path)?;
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::statvfs(c_path.as_ptr(), &mut stats) };
    if result != 0 {
        return Err(Error::device_detection(format!(
            "Failed to get filesystem statistics for {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }
    Ok((stats.f_bavail as u64).saturating_mul(stats.f_frsize as u64))
}

/// Compare the device ids of two existing paths
pub fn same_volume(a: &Path, b: &Path) -> Result<bool> {
    let dev = |path: &Path| {
        std::fs::metadata(path)
            .map(|m| m.dev())
            .map_err(|e| Error::with_path("stat", path, &e))
    };
    Ok(dev(a)? == dev(b)?)
}
