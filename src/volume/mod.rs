//! Volume enumeration and metadata backends
//!
//! One [`VolumeBackend`] per operating system:
//! - Linux: mount table text, `fstatvfs`, `/dev/disk/by-*` device tags
//! - macOS: `getmntinfo_r_np`, `fstatvfs`/`fstatfs`, Disk Arbitration
//! - Windows: logical drive strings, volume information APIs, `WNetGetConnectionW`
//!
//! Backends return raw per-OS results. Classification, filtering, ordering and
//! deadlines are applied on top by [`crate::Volumes`].

pub mod types;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(test)]
pub(crate) mod mock;

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
pub use types::{
    HiddenActions, HiddenMetadata, HiddenSupport, HideMethod, MountPoint, RemoteInfo,
    SetHiddenResult, VolumeHealth, VolumeMetadata,
};

/// Platform capability interface
///
/// Everything OS-specific lives behind this trait; the orchestration in
/// [`crate::volumes`] and [`crate::hidden`] depends only on it.
#[async_trait]
pub trait VolumeBackend: Send + Sync {
    /// Currently mounted volumes, unfiltered and in OS order
    async fn mount_points(&self, config: &Config) -> Result<Vec<MountPoint>>;

    /// Metadata for one mount point
    ///
    /// Enrichment failures degrade the result instead of failing it.
    async fn volume_metadata(&self, mount_point: &str, config: &Config) -> Result<VolumeMetadata>;

    /// Mount points from a secondary OS source, where one exists
    async fn alternate_mount_points(&self, _config: &Config) -> Result<Vec<MountPoint>> {
        Err(Error::Unsupported(
            "no alternate mount point source on this platform".to_string(),
        ))
    }

    /// Hidden mechanisms available on this OS
    fn hidden_support(&self) -> HiddenSupport;

    /// Read the OS hidden flag of an existing path
    fn read_system_flag(&self, _path: &Path) -> Result<bool> {
        Err(Error::Unsupported(
            "hidden flag not supported on this platform".to_string(),
        ))
    }

    /// Set or clear the OS hidden flag of an existing path
    fn write_system_flag(&self, _path: &Path, _hidden: bool) -> Result<()> {
        Err(Error::Unsupported(
            "hidden flag not supported on this platform".to_string(),
        ))
    }
}

/// Byte counts from block counts, failing instead of wrapping
#[cfg(unix)]
pub(crate) fn capacity(
    fragment_size: u64,
    block_size: u64,
    blocks: u64,
    blocks_free: u64,
    blocks_available: u64,
) -> Result<(u64, u64, u64)> {
    let unit = if fragment_size != 0 {
        fragment_size
    } else {
        block_size
    };
    let overflow = |what: &str| {
        Error::native(
            "fstatvfs",
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} calculation would overflow", what),
            ),
        )
    };

    let size = unit.checked_mul(blocks).ok_or_else(|| overflow("total size"))?;
    let available = unit
        .checked_mul(blocks_available)
        .ok_or_else(|| overflow("available space"))?;
    let used = unit
        .checked_mul(blocks.saturating_sub(blocks_free))
        .ok_or_else(|| overflow("used space"))?;
    Ok((size, used, available))
}

/// Backend for the operating system this crate was compiled for
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

#[async_trait]
impl VolumeBackend for NativeBackend {
    async fn mount_points(&self, config: &Config) -> Result<Vec<MountPoint>> {
        #[cfg(target_os = "linux")]
        {
            linux::mount_points(config).await
        }

        #[cfg(target_os = "macos")]
        {
            macos::mount_points(config).await
        }

        #[cfg(target_os = "windows")]
        {
            windows::mount_points(config).await
        }

        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            let _ = config;
            Err(Error::Unsupported(
                "volume enumeration not supported on this platform".to_string(),
            ))
        }
    }

    async fn volume_metadata(&self, mount_point: &str, config: &Config) -> Result<VolumeMetadata> {
        #[cfg(target_os = "linux")]
        {
            linux::volume_metadata(mount_point, config).await
        }

        #[cfg(target_os = "macos")]
        {
            macos::volume_metadata(mount_point, config).await
        }

        #[cfg(target_os = "windows")]
        {
            windows::volume_metadata(mount_point, config).await
        }

        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            let _ = (mount_point, config);
            Err(Error::Unsupported(
                "volume metadata not supported on this platform".to_string(),
            ))
        }
    }

    async fn alternate_mount_points(&self, config: &Config) -> Result<Vec<MountPoint>> {
        #[cfg(target_os = "linux")]
        {
            linux::alternate_mount_points(config).await
        }

        #[cfg(not(target_os = "linux"))]
        {
            let _ = config;
            Err(Error::Unsupported(
                "no alternate mount point source on this platform".to_string(),
            ))
        }
    }

    fn hidden_support(&self) -> HiddenSupport {
        #[cfg(target_os = "linux")]
        {
            linux::HIDDEN_SUPPORT
        }

        #[cfg(target_os = "macos")]
        {
            macos::HIDDEN_SUPPORT
        }

        #[cfg(target_os = "windows")]
        {
            windows::HIDDEN_SUPPORT
        }

        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            HiddenSupport {
                dot_prefix: true,
                system_flag: false,
            }
        }
    }

    fn read_system_flag(&self, path: &Path) -> Result<bool> {
        #[cfg(target_os = "macos")]
        {
            macos::read_hidden_flag(path)
        }

        #[cfg(target_os = "windows")]
        {
            windows::read_hidden_flag(path)
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let _ = path;
            Err(Error::Unsupported(
                "hidden flag not supported on this platform".to_string(),
            ))
        }
    }

    fn write_system_flag(&self, path: &Path, hidden: bool) -> Result<()> {
        #[cfg(target_os = "macos")]
        {
            macos::write_hidden_flag(path, hidden)
        }

        #[cfg(target_os = "windows")]
        {
            windows::write_hidden_flag(path, hidden)
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let _ = (path, hidden);
            Err(Error::Unsupported(
                "hidden flag not supported on this platform".to_string(),
            ))
        }
    }
}
