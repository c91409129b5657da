//! Value types shared by every platform backend

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Health of a mount point as reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VolumeHealth {
    /// Readable and answering
    Healthy,
    /// Metadata was read but an enrichment step failed
    Partial,
    /// Health probe exceeded its deadline
    Timeout,
    /// Missing, access denied or logon failure
    Inaccessible,
    /// Network share no longer connected
    Disconnected,
    /// Drive letter without a root directory
    Unavailable,
    /// Removable or optical drive without media
    NoMedia,
    /// Probe failed for another reason
    Error,
    /// Cannot determine health
    Unknown,
}

impl VolumeHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeHealth::Healthy => "healthy",
            VolumeHealth::Partial => "partial",
            VolumeHealth::Timeout => "timeout",
            VolumeHealth::Inaccessible => "inaccessible",
            VolumeHealth::Disconnected => "disconnected",
            VolumeHealth::Unavailable => "unavailable",
            VolumeHealth::NoMedia => "noMedia",
            VolumeHealth::Error => "error",
            VolumeHealth::Unknown => "unknown",
        }
    }

    /// Whether metadata can be expected from a volume in this state
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            VolumeHealth::Healthy | VolumeHealth::Partial | VolumeHealth::Unknown
        )
    }
}

impl fmt::Display for VolumeHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the mount table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountPoint {
    /// Normalized mount point path
    pub mount_point: String,
    /// Filesystem type (ext4, apfs, NTFS, ...)
    pub fstype: Option<String>,
    /// Health, where the OS reports one at enumeration time
    pub status: Option<VolumeHealth>,
    /// Classified as OS-internal rather than user data
    pub is_system_volume: bool,
    /// Problem encountered while enumerating this entry
    pub error: Option<String>,
}

impl MountPoint {
    pub fn new(mount_point: impl Into<String>, fstype: Option<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
            fstype,
            status: None,
            is_system_volume: false,
            error: None,
        }
    }
}

/// Remote share identity derived from a mount source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteInfo {
    pub uri: Option<String>,
    pub protocol: Option<String>,
    pub remote: bool,
    pub remote_user: Option<String>,
    pub remote_host: Option<String>,
    pub remote_share: Option<String>,
}

/// Everything known about one mounted volume
///
/// `used` and `available` reflect a live filesystem and may drift between
/// calls; every other field is stable for a given mount at a given time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMetadata {
    pub mount_point: String,
    pub fstype: Option<String>,
    pub status: Option<VolumeHealth>,
    pub is_system_volume: bool,
    /// Non-fatal note from a degraded enrichment, or the failure of this slot
    /// in a batch
    pub error: Option<String>,

    pub uri: Option<String>,
    pub protocol: Option<String>,
    pub remote: bool,
    pub remote_user: Option<String>,
    pub remote_host: Option<String>,
    pub remote_share: Option<String>,

    /// Volume label
    pub label: Option<String>,
    /// Total size in bytes
    pub size: u64,
    /// Used space in bytes
    pub used: u64,
    /// Space available to unprivileged users in bytes
    pub available: u64,
    /// Device or service path the volume is mounted from
    pub mount_from: Option<String>,
    /// Mount name reported by the OS
    pub mount_name: Option<String>,
    /// Filesystem UUID (volume serial number on Windows)
    pub uuid: Option<String>,
}

impl VolumeMetadata {
    pub fn new(mount_point: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
            ..Default::default()
        }
    }

    /// Copy remote identity in, keeping fields already set
    pub fn apply_remote(&mut self, info: RemoteInfo) {
        self.remote |= info.remote;
        self.uri = self.uri.take().or(info.uri);
        self.protocol = self.protocol.take().or(info.protocol);
        self.remote_user = self.remote_user.take().or(info.remote_user);
        self.remote_host = self.remote_host.take().or(info.remote_host);
        self.remote_share = self.remote_share.take().or(info.remote_share);
    }

    /// Remote identity view of this record
    pub fn remote_info(&self) -> RemoteInfo {
        RemoteInfo {
            uri: self.uri.clone(),
            protocol: self.protocol.clone(),
            remote: self.remote,
            remote_user: self.remote_user.clone(),
            remote_host: self.remote_host.clone(),
            remote_share: self.remote_share.clone(),
        }
    }

    /// Record an enrichment failure without failing the fetch
    pub fn degrade(&mut self, note: impl Into<String>) {
        self.status = Some(VolumeHealth::Partial);
        self.error = Some(note.into());
    }

    /// Usage percentage of total capacity
    pub fn usage_percent(&self) -> f32 {
        if self.size == 0 {
            0.0
        } else {
            (self.used as f64 / self.size as f64 * 100.0) as f32
        }
    }
}

/// Which hidden mechanisms this OS supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenSupport {
    /// Leading `.` in the base name
    pub dot_prefix: bool,
    /// OS hidden flag (`UF_HIDDEN`, `FILE_ATTRIBUTE_HIDDEN`)
    pub system_flag: bool,
}

/// Current hidden state of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenMetadata {
    pub hidden: bool,
    pub dot_prefix: bool,
    pub system_flag: bool,
    pub supported: HiddenSupport,
}

/// How `set_hidden` should hide or reveal a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HideMethod {
    /// Rename with or without a leading `.`
    DotPrefix,
    /// Toggle the OS hidden flag
    SystemFlag,
    /// Every supported mechanism
    All,
    /// Supported mechanisms, preferring the dot prefix where both exist
    #[default]
    Auto,
}

impl std::str::FromStr for HideMethod {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dotPrefix" | "dot-prefix" => Ok(HideMethod::DotPrefix),
            "systemFlag" | "system-flag" => Ok(HideMethod::SystemFlag),
            "all" => Ok(HideMethod::All),
            "auto" => Ok(HideMethod::Auto),
            other => Err(crate::Error::Validation(format!(
                "unknown hide method '{}'",
                other
            ))),
        }
    }
}

/// Which mechanisms `set_hidden` actually changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenActions {
    pub dot_prefix: bool,
    pub system_flag: bool,
}

/// Outcome of `set_hidden`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetHiddenResult {
    /// Path after any rename
    pub pathname: PathBuf,
    pub actions: HiddenActions,
}
