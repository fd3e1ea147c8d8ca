//! Temp and backup artifacts and the finalize/rollback protocol
//!
//! For a destination `D` the running copy writes `D.copying.tmp`; a file
//! already at `D` is renamed aside to `D.~bak` before the copy starts. The
//! real name is only ever written by one rename of the temp file. On any
//! failure the temp file is deleted and the backup renamed back, so `D` ends
//! up exactly as it was before the attempt.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vericp_types::{CopyFailure, FailureKind, FileTimes, TimestampAccessor};

/// Suffix of the in-progress temp file
pub const TEMP_SUFFIX: &str = ".copying.tmp";
/// Suffix of the renamed-aside destination
pub const BACKUP_SUFFIX: &str = ".~bak";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Whether anything, including a dangling link, sits at `path`
fn present(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// The three paths one copy touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    /// Final destination
    pub destination: PathBuf,
    /// In-progress temp file next to the destination
    pub temp: PathBuf,
    /// Backup of a pre-existing destination
    pub backup: PathBuf,
}

impl Artifacts {
    /// Derive the temp and backup names for `destination`
    pub fn for_destination(destination: &Path) -> Self {
        Self {
            destination: destination.to_path_buf(),
            temp: with_suffix(destination, TEMP_SUFFIX),
            backup: with_suffix(destination, BACKUP_SUFFIX),
        }
    }

    /// Clean up after a run that crashed before resolving its artifacts.
    ///
    /// A leftover temp file is deleted. A backup without a destination is the
    /// only surviving copy and is renamed back; a backup next to a destination
    /// is stale and deleted.
    pub(crate) fn recover_stale(&self) -> Result<(), CopyFailure> {
        let rejected = |action: &str, path: &Path, e: io::Error| {
            CopyFailure::preflight(format!(
                "cannot {} stale artifact {}: {}",
                action,
                path.display(),
                e
            ))
        };

        if remove_if_present(&self.temp).map_err(|e| rejected("delete", &self.temp, e))? {
            warn!("Deleted stale temp file {}", self.temp.display());
        }

        if present(&self.backup) {
            if present(&self.destination) {
                fs::remove_file(&self.backup).map_err(|e| rejected("delete", &self.backup, e))?;
                warn!("Deleted stale backup {}", self.backup.display());
            } else {
                fs::rename(&self.backup, &self.destination)
                    .map_err(|e| rejected("restore", &self.backup, e))?;
                warn!(
                    "Restored stale backup {} to {}",
                    self.backup.display(),
                    self.destination.display()
                );
            }
        }
        Ok(())
    }
}

/// A staged operation: the destination, if any, has been moved to the
/// backup name and its times recorded.
///
/// Consumed by exactly one of [`Stage::finalize`] or [`Stage::rollback`].
pub(crate) struct Stage<'a> {
    artifacts: &'a Artifacts,
    timestamps: &'a dyn TimestampAccessor,
    backup_times: Option<FileTimes>,
}

impl<'a> Stage<'a> {
    /// Move an existing destination aside
    pub fn begin(
        artifacts: &'a Artifacts,
        timestamps: &'a dyn TimestampAccessor,
    ) -> Result<Self, CopyFailure> {
        let backup_times = if present(&artifacts.destination) {
            let times = timestamps.get_times(&artifacts.destination).map_err(|e| {
                CopyFailure::preflight(format!(
                    "cannot read times of {}: {}",
                    artifacts.destination.display(),
                    e
                ))
            })?;
            fs::rename(&artifacts.destination, &artifacts.backup).map_err(|e| {
                CopyFailure::preflight(format!(
                    "cannot move {} aside: {}",
                    artifacts.destination.display(),
                    e
                ))
            })?;
            debug!(
                "Backed up {} to {}",
                artifacts.destination.display(),
                artifacts.backup.display()
            );
            Some(times)
        } else {
            None
        };

        Ok(Self {
            artifacts,
            timestamps,
            backup_times,
        })
    }

    /// Whether a backup was taken
    pub fn has_backup(&self) -> bool {
        self.backup_times.is_some()
    }

    /// Apply the source times to the verified temp file, rename it onto the
    /// destination and drop the backup.
    ///
    /// Times are applied before the rename so the destination never carries
    /// the copy's own times under its real name.
    pub fn finalize(self, source_times: &FileTimes) -> Result<(), CopyFailure> {
        let artifacts = self.artifacts;
        let temp = &artifacts.temp;
        if !self.timestamps.set_times(temp, source_times) {
            let failure = CopyFailure::new(
                FailureKind::FinalizeFailed,
                format!("cannot apply source times to {}", temp.display()),
            );
            return Err(self.rollback(failure));
        }

        if let Err(e) = fs::rename(temp, &artifacts.destination) {
            let failure = CopyFailure::new(
                FailureKind::FinalizeFailed,
                format!(
                    "cannot rename {} to {}: {}",
                    temp.display(),
                    artifacts.destination.display(),
                    e
                ),
            );
            return Err(self.rollback(failure));
        }

        if self.has_backup() {
            match fs::remove_file(&artifacts.backup) {
                Ok(()) => debug!("Deleted backup {}", artifacts.backup.display()),
                // The next copy to this destination removes it
                Err(e) => warn!(
                    "Cannot delete backup {}: {}",
                    artifacts.backup.display(),
                    e
                ),
            }
        }
        Ok(())
    }

    /// Delete the temp file and put the backup back. Errors raised on the way
    /// are attached to `failure` rather than replacing it.
    pub fn rollback(self, failure: CopyFailure) -> CopyFailure {
        let mut errors = Vec::new();

        match remove_if_present(&self.artifacts.temp) {
            Ok(true) => debug!("Deleted temp file {}", self.artifacts.temp.display()),
            Ok(false) => {}
            Err(e) => errors.push(format!(
                "cannot delete {}: {}",
                self.artifacts.temp.display(),
                e
            )),
        }

        if let Some(times) = self.backup_times {
            let destination = &self.artifacts.destination;
            if present(destination) {
                errors.push(format!(
                    "{} exists; backup kept at {}",
                    destination.display(),
                    self.artifacts.backup.display()
                ));
            } else if let Err(e) = fs::rename(&self.artifacts.backup, destination) {
                errors.push(format!(
                    "cannot restore {} from {}: {}",
                    destination.display(),
                    self.artifacts.backup.display(),
                    e
                ));
            } else if !self.timestamps.set_times(destination, &times) {
                errors.push(format!("cannot restore times of {}", destination.display()));
            } else {
                info!("Restored {} from backup", destination.display());
            }
        }

        if errors.is_empty() {
            failure
        } else {
            let restore_error = errors.join("; ");
            warn!("Rollback incomplete: {}", restore_error);
            failure.with_restore_error(restore_error)
        }
    }
}
