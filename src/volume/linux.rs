//! Linux backend
//!
//! Enumeration reads the mount table text. Capacity comes from `fstatvfs` on
//! a descriptor opened with `O_DIRECTORY`, so the numbers belong to the
//! directory that was opened even if the mount changes underneath. Device
//! UUID and label come from the udev `/dev/disk/by-*` symlinks.

use super::capacity;
use super::types::{HiddenSupport, MountPoint, VolumeHealth, VolumeMetadata};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mtab::{self, escape};
use crate::path::{normalize_posix_path, validate_path};
use crate::remote::{is_network_fs, parse_remote_spec};
use crate::timeout::offload;
use log::{debug, warn};
use nix::sys::statvfs::fstatvfs;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Dot prefix only; Linux has no hidden attribute
pub const HIDDEN_SUPPORT: HiddenSupport = HiddenSupport {
    dot_prefix: true,
    system_flag: false,
};

/// Kernel view of this process's mounts, with mount ids and parents
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Root of the udev symlink farm
pub const DEV_DISK_DIR: &str = "/dev/disk";

pub async fn mount_points(config: &Config) -> Result<Vec<MountPoint>> {
    let tables = config.linux_mount_table_paths.clone();
    offload("read mount table", move || list_mount_points(&tables)).await
}

pub async fn volume_metadata(mount_point: &str, config: &Config) -> Result<VolumeMetadata> {
    let mount_point = mount_point.to_string();
    let tables = config.linux_mount_table_paths.clone();
    offload("fstatvfs", move || read_volume_metadata(&mount_point, &tables)).await
}

/// Mount points from `/proc/self/mountinfo`
pub async fn alternate_mount_points(_config: &Config) -> Result<Vec<MountPoint>> {
    offload("read mountinfo", || {
        let content = fs::read_to_string(MOUNTINFO_PATH)
            .map_err(|e| Error::from_path_io("read", MOUNTINFO_PATH, e))?;
        parse_mountinfo(&content)
    })
    .await
}

fn list_mount_points(tables: &[String]) -> Result<Vec<MountPoint>> {
    let (source, entries) = mtab::read_first_readable(tables)?;
    debug!(
        "[linux] {} entries from {}",
        entries.len(),
        source.display()
    );
    Ok(entries
        .into_iter()
        .map(|e| MountPoint::new(e.fs_file, e.fs_vfstype))
        .collect())
}

fn read_volume_metadata(mount_point: &str, tables: &[String]) -> Result<VolumeMetadata> {
    validate_path(Path::new(mount_point))?;
    let mount_point = normalize_posix_path(mount_point);

    let mut md = VolumeMetadata::new(mount_point.clone());
    let (size, used, available) = stat_volume(&mount_point)?;
    md.size = size;
    md.used = used;
    md.available = available;
    md.status = Some(VolumeHealth::Healthy);

    match mtab::read_first_readable(tables) {
        Ok((_, entries)) => {
            if let Some(entry) = mtab::find_entry(&entries, &mount_point) {
                md.fstype = entry.fs_vfstype.clone();
                md.mount_from = Some(entry.fs_spec.clone());
                if let Some(info) = parse_remote_spec(&entry.fs_spec, entry.fs_vfstype.as_deref())
                {
                    md.apply_remote(info);
                }
                if entry.fs_vfstype.as_deref().is_some_and(is_network_fs) {
                    md.remote = true;
                }
            }
        }
        Err(e) => {
            warn!("[linux] mount table lookup failed for {}: {}", mount_point, e);
            md.degrade(format!("mount table unavailable: {}", e));
        }
    }

    if let Some(device) = md.mount_from.clone().filter(|d| d.starts_with("/dev/")) {
        match DeviceTagCache::global().lookup(Path::new(&device)) {
            Ok(Some(tags)) => {
                md.uuid = tags.uuid;
                md.label = tags.label;
            }
            Ok(None) => debug!("[linux] no device tags for {}", device),
            Err(e) => {
                warn!("[linux] device tag lookup failed for {}: {}", device, e);
                md.degrade(format!("device tags unavailable: {}", e));
            }
        }
    }

    debug!(
        "[linux] {} {{size: {:.3} GB, available: {:.3} GB}}",
        mount_point,
        md.size as f64 / 1e9,
        md.available as f64 / 1e9
    );
    Ok(md)
}

/// `(size, used, available)` in bytes of the filesystem holding `mount_point`
fn stat_volume(mount_point: &str) -> Result<(u64, u64, u64)> {
    let dir = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(mount_point)
        .map_err(|e| Error::from_path_io("open", mount_point, e))?;

    let stat = fstatvfs(&dir).map_err(|e| {
        Error::from_path_io("fstatvfs", mount_point, io::Error::from(e))
    })?;

    capacity(
        stat.fragment_size() as u64,
        stat.block_size() as u64,
        stat.blocks() as u64,
        stat.blocks_free() as u64,
        stat.blocks_available() as u64,
    )
}

/// Parse `/proc/<pid>/mountinfo`
///
/// `id parent major:minor root mountpoint options [optional...] - fstype source superoptions`
pub fn parse_mountinfo(content: &str) -> Result<Vec<MountPoint>> {
    let mut mounts = Vec::new();
    for line in content.lines() {
        let Some((pre, post)) = line.split_once(" - ") else {
            continue;
        };
        let pre_fields: Vec<&str> = pre.split_whitespace().collect();
        if pre_fields.len() < 5 {
            continue;
        }
        let mount_point = normalize_posix_path(&escape::decode(pre_fields[4])?);
        let fstype = post
            .split_whitespace()
            .next()
            .map(escape::decode)
            .transpose()?;
        mounts.push(MountPoint::new(mount_point, fstype));
    }
    Ok(mounts)
}

/// UUID and label of a block device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTags {
    pub uuid: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Default)]
struct TagIndex {
    by_device: HashMap<PathBuf, DeviceTags>,
    /// Devices with no tags; kept across rescans until the cache is closed
    misses: HashSet<PathBuf>,
    /// Number of directory scans since the cache was opened
    scans: u64,
}

impl TagIndex {
    fn scan(root: &Path) -> Result<Self> {
        let mut index = TagIndex::default();
        index.scan_dir(&root.join("by-uuid"), |tags, value| tags.uuid = Some(value))?;
        index.scan_dir(&root.join("by-label"), |tags, value| tags.label = Some(value))?;
        Ok(index)
    }

    fn scan_dir(&mut self, dir: &Path, set: impl Fn(&mut DeviceTags, String)) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            // machines without udev, or without labelled devices
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::from_path_io("read_dir", dir, e)),
        };

        for entry in entries.flatten() {
            let link = entry.path();
            let device = match fs::canonicalize(&link) {
                Ok(device) => device,
                Err(e) => {
                    debug!("[linux] dangling device link {}: {}", link.display(), e);
                    continue;
                }
            };
            let value = decode_udev(&entry.file_name().to_string_lossy());
            set(self.by_device.entry(device).or_default(), value);
        }
        Ok(())
    }
}

/// Process-wide index of `/dev/disk/by-*` tags
///
/// Built on first use and dropped by [`DeviceTagCache::close`]. A device that
/// is not in the index triggers one rescan; if it is still untagged it is
/// remembered as a miss, so loop and zram devices do not rescan on every
/// fetch. Misses are forgotten on close.
pub struct DeviceTagCache {
    root: PathBuf,
    index: Mutex<Option<TagIndex>>,
}

impl DeviceTagCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: Mutex::new(None),
        }
    }

    /// The shared cache over [`DEV_DISK_DIR`]
    pub fn global() -> &'static DeviceTagCache {
        static CACHE: OnceLock<DeviceTagCache> = OnceLock::new();
        CACHE.get_or_init(|| DeviceTagCache::new(DEV_DISK_DIR))
    }

    /// Tags of `device`, following symlinks such as `/dev/mapper/*`
    pub fn lookup(&self, device: &Path) -> Result<Option<DeviceTags>> {
        let device = fs::canonicalize(device).unwrap_or_else(|_| device.to_path_buf());
        let mut guard = self
            .index
            .lock()
            .map_err(|e| Error::Task(format!("device tag cache poisoned: {}", e)))?;

        if let Some(index) = guard.as_ref() {
            if let Some(tags) = index.by_device.get(&device) {
                return Ok(Some(tags.clone()));
            }
            if index.misses.contains(&device) {
                return Ok(None);
            }
        }

        debug!("[linux] scanning {} for {}", self.root.display(), device.display());
        let mut index = TagIndex::scan(&self.root)?;
        if let Some(previous) = guard.take() {
            index.misses = previous.misses;
            index.scans = previous.scans;
        }
        index.scans += 1;

        let found = index.by_device.get(&device).cloned();
        if found.is_none() {
            index.misses.insert(device);
        }
        *guard = Some(index);
        Ok(found)
    }

    /// Release the index; the next lookup rebuilds it
    pub fn close(&self) {
        if let Ok(mut guard) = self.index.lock() {
            *guard = None;
        }
    }

    fn is_open(&self) -> bool {
        self.index.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    #[cfg(test)]
    fn scans(&self) -> u64 {
        self.index
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|index| index.scans))
            .unwrap_or(0)
    }
}

/// Release the process-wide device tag index
pub fn close_device_tag_cache() {
    DeviceTagCache::global().close();
}

/// Decode udev's `\xHH` escapes in by-label/by-uuid names
fn decode_udev(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() && bytes[i + 1] == b'x' {
            let decoded = std::str::from_utf8(&bytes[i + 2..i + 4])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
