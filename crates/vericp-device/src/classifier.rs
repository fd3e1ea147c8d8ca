//! Location classification
//!
//! Classification works on a resolved path: symbolic links are followed, and a
//! path that does not exist yet (a fresh destination) is classified by its
//! nearest existing ancestor. The path as given is passed along too, since on
//! Windows a mapped drive resolves to the share behind it.

use std::path::{Path, PathBuf};
use tracing::debug;
use vericp_types::{LocationClass, LocationClassifier};

/// Platform location classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeClassifier;

impl VolumeClassifier {
    /// Create a new classifier
    pub fn new() -> Self {
        Self
    }
}

impl LocationClassifier for VolumeClassifier {
    fn classify(&self, path: &Path) -> LocationClass {
        if is_unc_syntax(path) {
            debug!("Rejecting unmapped share syntax: {}", path.display());
            return LocationClass::Unresolvable;
        }

        let Some(resolved) = nearest_existing_ancestor(path) else {
            debug!("No existing ancestor for {}", path.display());
            return LocationClass::Unresolvable;
        };

        let class = classify_resolved(&absolute(path), &resolved);
        debug!(
            "Classified {} (resolved {}) as {}",
            path.display(),
            resolved.display(),
            class
        );
        class
    }
}

#[cfg(unix)]
fn classify_resolved(_given: &Path, resolved: &Path) -> LocationClass {
    crate::unix::classify(resolved)
}

#[cfg(windows)]
fn classify_resolved(given: &Path, resolved: &Path) -> LocationClass {
    crate::windows::classify(given, resolved)
}

#[cfg(not(any(unix, windows)))]
fn classify_resolved(_given: &Path, _resolved: &Path) -> LocationClass {
    LocationClass::Unresolvable
}

/// Whether `path` uses unmapped network share syntax (`\\server\share` or
/// `//server/share`). Such paths must be mapped to a drive or mount first.
pub fn is_unc_syntax(path: &Path) -> bool {
    #[cfg(windows)]
    {
        use std::path::{Component, Prefix};
        if let Some(Component::Prefix(prefix)) = path.components().next() {
            return matches!(prefix.kind(), Prefix::UNC(..) | Prefix::VerbatimUNC(..));
        }
        false
    }

    #[cfg(not(windows))]
    {
        let text = path.as_os_str().to_string_lossy();
        text.starts_with("//") || text.starts_with(r"\\")
    }
}

/// `path` joined onto the working directory when relative, without resolving
/// links
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
}

/// Canonicalize `path`, or its nearest ancestor that exists.
///
/// Returns `None` only when not even the root (or the working directory, for
/// relative paths) can be resolved.
pub fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors().find_map(|ancestor| {
        let candidate = if ancestor.as_os_str().is_empty() {
            Path::new(".")
        } else {
            ancestor
        };
        std::fs::canonicalize(candidate).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("//server/share/file.bin", true)]
    #[case(r"\\server\share\file.bin", true)]
    #[case("relative/file.bin", false)]
    fn test_unc_syntax(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_unc_syntax(Path::new(path)), expected);
    }

    #[test]
    fn test_unc_is_unresolvable() {
        let classifier = VolumeClassifier::new();
        assert_eq!(
            classifier.classify(Path::new("//server/share/file.bin")),
            LocationClass::Unresolvable
        );
    }

    #[test]
    fn test_missing_path_uses_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("a/b/c/file.bin");

        let resolved = nearest_existing_ancestor(&missing).unwrap();
        assert_eq!(resolved, std::fs::canonicalize(temp_dir.path()).unwrap());

        let classifier = VolumeClassifier::new();
        assert_eq!(
            classifier.classify(&missing),
            classifier.classify(temp_dir.path())
        );
    }

    #[test]
    fn test_absolute_keeps_given_form() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute(Path::new("x/y.bin")), cwd.join("x/y.bin"));
        assert_eq!(absolute(&cwd), cwd);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_classified_by_target() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("target.bin");
        std::fs::write(&target, b"data").unwrap();
        let link = temp_dir.path().join("link.bin");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(
            nearest_existing_ancestor(&link),
            Some(std::fs::canonicalize(&target).unwrap())
        );
    }
}
