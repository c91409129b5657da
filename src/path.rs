//! Mount point normalization and path validation

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::env;
use std::path::{Component, Path, PathBuf};

/// Strip trailing slashes, keeping `/` itself
///
/// `/home//` becomes `/home`; `/` and `///` become `/`.
pub fn normalize_posix_path(mount_point: &str) -> String {
    let trimmed = mount_point.trim_end_matches('/');
    if trimmed.is_empty() && mount_point.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Turn a bare drive letter into its upper-cased root
///
/// `c:` becomes `C:\`. Paths that already contain a backslash, UNC paths and
/// anything else pass through unchanged.
pub fn normalize_windows_path(mount_point: &str) -> String {
    let bytes = mount_point.as_bytes();
    if bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        format!("{}:\\", char::from(bytes[0].to_ascii_uppercase()))
    } else {
        mount_point.to_string()
    }
}

/// Normalize with the host convention
pub fn normalize_mount_point(mount_point: &str) -> String {
    #[cfg(windows)]
    {
        normalize_windows_path(mount_point)
    }
    #[cfg(not(windows))]
    {
        normalize_posix_path(mount_point)
    }
}

/// Reject empty paths and paths with interior NUL bytes
pub fn validate_path(path: &Path) -> Result<()> {
    let raw = path.as_os_str();
    if raw.is_empty() {
        return Err(Error::Validation("path must not be empty".to_string()));
    }
    if raw.to_string_lossy().contains('\0') {
        return Err(Error::Validation(format!(
            "path contains a NUL byte: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Make `path` absolute without touching the filesystem
///
/// Resolves `.` and `..` lexically against the current directory. Symlinks
/// are not followed, so hiding a link renames the link itself.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    validate_path(path)?;

    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // popping past the root is a no-op
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// Whether `path` is a filesystem root (`/`, `C:\`, `\\server\share\`)
pub fn is_root(path: &Path) -> bool {
    path.parent().is_none()
}

/// Case-insensitive ordering, case-sensitive as a tie-break
///
/// Groups `/Volumes/data` next to `/volumes/Backup` the way a locale
/// collation would while keeping the order total.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}
