//! Error types for volmeta

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for volmeta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
///
/// Mandatory failures surface as one of these variants. Failures of optional
/// enrichment steps never do: they degrade the returned
/// [`VolumeMetadata`](crate::VolumeMetadata) instead (see
/// [`VolumeHealth::Partial`](crate::VolumeHealth::Partial)).
#[derive(Error, Debug)]
pub enum Error {
    /// A raced operation did not settle before its deadline
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Name given to the race that expired
        operation: String,
        /// Deadline of that race
        timeout_ms: u64,
    },

    /// Mount point or path is missing, unreadable or not a directory
    #[error("{} is not accessible: {source}", path.display())]
    NotAccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An OS API call failed
    #[error("{operation} failed: {source}")]
    NativeCall {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// Malformed input or configuration
    #[error("Invalid value: {0}")]
    Validation(String),

    /// Mount-table text contained an escape outside `\001`..`\377`
    #[error("Invalid escape sequence: {0}")]
    InvalidEscape(String),

    /// Operation not available on this platform
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// A worker task or thread died before reporting a result
    #[error("Worker failed: {0}")]
    Task(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Wrap an OS error for the named call
    pub fn native(operation: impl Into<String>, source: io::Error) -> Self {
        Error::NativeCall {
            operation: operation.into(),
            source,
        }
    }

    /// Wrap `errno`/`GetLastError()` of the call that just failed
    pub fn last_os_error(operation: impl Into<String>) -> Self {
        Self::native(operation, io::Error::last_os_error())
    }

    /// Map an I/O failure on `path` to the taxonomy: missing, denied and
    /// not-a-directory are access problems, everything else is a native failure
    pub fn from_path_io(operation: &str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if is_access_error(&source) {
            Error::NotAccessible { path, source }
        } else {
            Error::NativeCall {
                operation: format!("{} {}", operation, path.display()),
                source,
            }
        }
    }

    /// True for [`Error::Timeout`]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// OS error code of the underlying failure, if any
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Error::NotAccessible { source, .. }
            | Error::NativeCall { source, .. }
            | Error::Io(source) => source.raw_os_error(),
            _ => None,
        }
    }
}

fn is_access_error(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    ) {
        return true;
    }
    #[cfg(unix)]
    {
        if err.raw_os_error() == Some(libc::ENOTDIR) {
            return true;
        }
    }
    false
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

#[cfg(unix)]
impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Self {
        Error::Io(io::Error::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_is_not_accessible() {
        let err = Error::from_path_io(
            "open",
            "/nonexistent",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(matches!(err, Error::NotAccessible { .. }));
    }

    #[test]
    fn test_native_call_keeps_os_code() {
        let err = Error::native("statvfs", io::Error::from_raw_os_error(5));
        assert_eq!(err.os_code(), Some(5));
        assert!(err.to_string().starts_with("statvfs failed"));
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::Timeout {
            operation: "fetchMetadata(/)".to_string(),
            timeout_ms: 1,
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "fetchMetadata(/) timed out after 1ms");
    }
}
