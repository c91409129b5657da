//! Hidden file attributes
//!
//! Two independent mechanisms, each supported or not per OS:
//! - dot prefix: a leading `.` in the base name (Linux, macOS)
//! - system flag: `UF_HIDDEN` on macOS, `FILE_ATTRIBUTE_HIDDEN` on Windows
//!
//! A path is hidden when any supported mechanism says so. The flag itself is
//! read and written by the platform backend; this module decides what to
//! change and performs dot-prefix renames.

use crate::error::{Error, Result};
use crate::path::{absolutize, is_root};
use crate::volume::types::{HiddenActions, HiddenMetadata, HideMethod, SetHiddenResult};
use crate::volume::VolumeBackend;
use log::debug;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn has_dot_prefix(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn exists(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        // a path below a regular file
        #[cfg(unix)]
        Err(e) if e.raw_os_error() == Some(libc::ENOTDIR) => Ok(false),
        Err(e) => Err(Error::from_path_io("stat", path, e)),
    }
}

/// Whether `path` is hidden by any supported mechanism
///
/// A missing path is not hidden.
pub fn is_hidden<B: VolumeBackend + ?Sized>(backend: &B, path: &Path) -> Result<bool> {
    let metadata = get_hidden_metadata(backend, path)?;
    Ok(metadata.hidden)
}

/// Full hidden state of `path` without changing anything
///
/// A missing path reports every mechanism as false.
pub fn get_hidden_metadata<B: VolumeBackend + ?Sized>(
    backend: &B,
    path: &Path,
) -> Result<HiddenMetadata> {
    let path = absolutize(path)?;
    let supported = backend.hidden_support();

    let mut metadata = HiddenMetadata {
        hidden: false,
        dot_prefix: false,
        system_flag: false,
        supported,
    };
    if !exists(&path)? {
        return Ok(metadata);
    }

    metadata.dot_prefix = supported.dot_prefix && has_dot_prefix(&path);
    metadata.system_flag = supported.system_flag && backend.read_system_flag(&path)?;
    metadata.hidden = metadata.dot_prefix || metadata.system_flag;
    Ok(metadata)
}

/// Whether `path` or any ancestor below the filesystem root is hidden
pub fn is_hidden_recursive<B: VolumeBackend + ?Sized>(backend: &B, path: &Path) -> Result<bool> {
    let mut current = absolutize(path)?;
    loop {
        if is_root(&current) {
            return Ok(false);
        }
        if is_hidden(backend, &current)? {
            return Ok(true);
        }
        if !current.pop() {
            return Ok(false);
        }
    }
}

/// Hide or reveal `path`
///
/// Only mechanisms whose state actually changed are reported in `actions`,
/// so repeating a call is a no-op. `pathname` is the path after any rename.
pub fn set_hidden<B: VolumeBackend + ?Sized>(
    backend: &B,
    path: &Path,
    hide: bool,
    method: HideMethod,
) -> Result<SetHiddenResult> {
    let path = absolutize(path)?;
    let supported = backend.hidden_support();

    match method {
        HideMethod::DotPrefix if !supported.dot_prefix => {
            return Err(Error::Unsupported(
                "dotPrefix hiding is not supported on this platform".to_string(),
            ));
        }
        HideMethod::SystemFlag if !supported.system_flag => {
            return Err(Error::Unsupported(
                "systemFlag hiding is not supported on this platform".to_string(),
            ));
        }
        _ => {}
    }

    if !exists(&path)? {
        return Err(Error::NotAccessible {
            path,
            source: io::Error::from(io::ErrorKind::NotFound),
        });
    }

    let current_flag = if supported.system_flag {
        backend.read_system_flag(&path)?
    } else {
        false
    };

    let apply_dot = match method {
        HideMethod::DotPrefix => true,
        HideMethod::SystemFlag => false,
        HideMethod::All | HideMethod::Auto => supported.dot_prefix,
    };
    let apply_flag = match method {
        HideMethod::DotPrefix => false,
        HideMethod::SystemFlag => true,
        HideMethod::All => supported.system_flag,
        // With both available the rename alone hides; a leftover flag is
        // still cleared when revealing.
        HideMethod::Auto => {
            supported.system_flag && (!supported.dot_prefix || (!hide && current_flag))
        }
    };

    let mut actions = HiddenActions::default();
    let mut pathname = path;

    if apply_dot && has_dot_prefix(&pathname) != hide {
        pathname = rename_dot_prefix(&pathname, hide)?;
        actions.dot_prefix = true;
    }

    if apply_flag && current_flag != hide {
        backend.write_system_flag(&pathname, hide)?;
        actions.system_flag = true;
    }

    debug!(
        "[hidden] {} hide={} method={:?} -> {:?}",
        pathname.display(),
        hide,
        method,
        actions
    );
    Ok(SetHiddenResult { pathname, actions })
}

fn rename_dot_prefix(path: &Path, hide: bool) -> Result<PathBuf> {
    if is_root(path) {
        return Err(Error::Validation(format!(
            "cannot rename the root directory {}",
            path.display()
        )));
    }
    let name = path
        .file_name()
        .ok_or_else(|| Error::Validation(format!("{} has no file name", path.display())))?
        .to_string_lossy()
        .into_owned();

    let new_name: OsString = if hide {
        format!(".{}", name).into()
    } else {
        let stripped = name.trim_start_matches('.');
        if stripped.is_empty() {
            return Err(Error::Validation(format!(
                "cannot unhide {}: name would be empty",
                path.display()
            )));
        }
        stripped.into()
    };

    let target = path.with_file_name(new_name);
    if target.exists() {
        return Err(Error::native(
            format!("rename {} to {}", path.display(), target.display()),
            io::Error::from(io::ErrorKind::AlreadyExists),
        ));
    }

    fs::rename(path, &target).map_err(|e| Error::from_path_io("rename", path, e))?;
    Ok(target)
}
