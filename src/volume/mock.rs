//! In-memory backend for unit tests

use super::types::{HiddenSupport, MountPoint, VolumeMetadata};
use super::VolumeBackend;
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Scripted backend
///
/// The hidden flag is modelled with the read-only permission bit, which like
/// the real flags travels with the file across renames.
#[derive(Debug, Clone)]
pub struct MockBackend {
    pub support: HiddenSupport,
    pub mounts: Vec<MountPoint>,
    pub metadata: HashMap<String, VolumeMetadata>,
    pub delay: Option<Duration>,
}

impl MockBackend {
    pub fn with_support(support: HiddenSupport) -> Self {
        Self {
            support,
            mounts: Vec::new(),
            metadata: HashMap::new(),
            delay: None,
        }
    }

    pub fn with_mounts(mounts: &[(&str, Option<&str>)]) -> Self {
        let mut backend = Self::with_support(HiddenSupport {
            dot_prefix: true,
            system_flag: false,
        });
        for (mount_point, fstype) in mounts {
            backend
                .mounts
                .push(MountPoint::new(*mount_point, fstype.map(str::to_string)));
            let mut md = VolumeMetadata::new(*mount_point);
            md.fstype = fstype.map(str::to_string);
            md.size = 1 << 30;
            md.used = 1 << 29;
            md.available = 1 << 29;
            backend.metadata.insert(mount_point.to_string(), md);
        }
        backend
    }

    pub fn flag_set(&self, path: &Path) -> bool {
        fs::metadata(path)
            .map(|m| m.permissions().readonly())
            .unwrap_or(false)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl VolumeBackend for MockBackend {
    async fn mount_points(&self, _config: &Config) -> Result<Vec<MountPoint>> {
        self.pause().await;
        Ok(self.mounts.clone())
    }

    async fn volume_metadata(&self, mount_point: &str, _config: &Config) -> Result<VolumeMetadata> {
        self.pause().await;
        self.metadata.get(mount_point).cloned().ok_or_else(|| {
            Error::NotAccessible {
                path: mount_point.into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }
        })
    }

    fn hidden_support(&self) -> HiddenSupport {
        self.support
    }

    fn read_system_flag(&self, path: &Path) -> Result<bool> {
        Ok(fs::metadata(path)?.permissions().readonly())
    }

    fn write_system_flag(&self, path: &Path, hidden: bool) -> Result<()> {
        let mut perms = fs::metadata(path)?.permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(hidden);
        fs::set_permissions(path, perms)?;
        Ok(())
    }
}
