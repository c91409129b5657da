//! Windows backend
//!
//! Drives come from `GetLogicalDriveStringsW`. Each drive gets a health probe
//! (`FindFirstFileExW` on the root) on a watchdog thread, since a dead network
//! share can block that call for minutes. Metadata is read with
//! `GetVolumeInformationW` and `GetDiskFreeSpaceExW`; mapped network drives
//! add their UNC source from `WNetGetConnectionW`.

use super::types::{HiddenSupport, MountPoint, VolumeHealth, VolumeMetadata};
use crate::concurrent::map_concurrent;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::guard::{ForeignHandle, Owned};
use crate::path::{normalize_windows_path, validate_path};
use crate::remote::parse_remote_path;
use crate::timeout::{offload, watchdog};
use log::{debug, warn};
use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use windows::core::PCWSTR;
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Storage::FileSystem::{
    FindClose, FindExInfoBasic, FindExSearchNameMatch, FindFirstFileExW, GetDiskFreeSpaceExW,
    GetDriveTypeW, GetFileAttributesW, GetLogicalDriveStringsW, GetVolumeInformationW,
    SetFileAttributesW, FILE_ATTRIBUTE_HIDDEN, FILE_ATTRIBUTE_NORMAL, FILE_FLAGS_AND_ATTRIBUTES,
    FIND_FIRST_EX_LARGE_FETCH, WIN32_FIND_DATAW,
};
use windows::Win32::System::SystemInformation::GetWindowsDirectoryW;

/// Only the hidden attribute; dot files are ordinary names on Windows
pub const HIDDEN_SUPPORT: HiddenSupport = HiddenSupport {
    dot_prefix: false,
    system_flag: true,
};

// GetDriveTypeW results
const DRIVE_UNKNOWN: u32 = 0;
const DRIVE_NO_ROOT_DIR: u32 = 1;
const DRIVE_REMOVABLE: u32 = 2;
const DRIVE_FIXED: u32 = 3;
const DRIVE_REMOTE: u32 = 4;
const DRIVE_CDROM: u32 = 5;
const DRIVE_RAMDISK: u32 = 6;

// Win32 error codes
const ERROR_FILE_NOT_FOUND: u32 = 2;
const ERROR_PATH_NOT_FOUND: u32 = 3;
const ERROR_ACCESS_DENIED: u32 = 5;
const ERROR_BAD_NETPATH: u32 = 53;
const ERROR_NETWORK_ACCESS_DENIED: u32 = 65;
const ERROR_BAD_NET_NAME: u32 = 67;
const ERROR_MORE_DATA: u32 = 234;
const ERROR_NETWORK_UNREACHABLE: u32 = 1231;
const ERROR_LOGON_FAILURE: u32 = 1326;
const ERROR_NOT_CONNECTED: u32 = 2250;

const INVALID_FILE_ATTRIBUTES: u32 = u32::MAX;

/// Volume flags that mark the volume hosting OS files
const FILE_SUPPORTS_SYSTEM_PATHS: u32 = 0x0010_0000;
const FILE_SUPPORTS_SYSTEM_FILES: u32 = 0x0020_0000;

const MAX_PATH: usize = 260;

#[link(name = "mpr")]
extern "system" {
    fn WNetGetConnectionW(
        lpLocalName: *const u16,
        lpRemoteName: *mut u16,
        lpnLength: *mut u32,
    ) -> u32;
}

#[derive(Clone, Copy)]
struct FindHandle(HANDLE);

// SAFETY: FindClose is the release for handles from FindFirstFileExW
unsafe impl ForeignHandle for FindHandle {
    const RELEASE: &'static str = "FindClose";

    fn is_null(&self) -> bool {
        self.0.is_invalid()
    }

    unsafe fn release(self) {
        let _ = FindClose(self.0);
    }
}

/// NUL-terminated UTF-16 copy of `s`
fn wide(s: impl AsRef<OsStr>) -> Vec<u16> {
    s.as_ref().encode_wide().chain(std::iter::once(0)).collect()
}

/// String up to the first NUL of a UTF-16 buffer
fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

fn win32_code(err: &windows::core::Error) -> u32 {
    // HRESULT_FROM_WIN32 keeps the Win32 code in the low word
    (err.code().0 as u32) & 0xFFFF
}

fn to_io(err: &windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(win32_code(err) as i32)
}

/// Health from the Win32 error of a failed root listing
fn health_from_error(code: u32) -> VolumeHealth {
    match code {
        ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND | ERROR_ACCESS_DENIED
        | ERROR_LOGON_FAILURE => VolumeHealth::Inaccessible,
        ERROR_BAD_NET_NAME
        | ERROR_NETWORK_UNREACHABLE
        | ERROR_NOT_CONNECTED
        | ERROR_NETWORK_ACCESS_DENIED
        | ERROR_BAD_NETPATH => VolumeHealth::Disconnected,
        _ => VolumeHealth::Unknown,
    }
}

/// Status of a drive from its type and whether its root answers
fn drive_status(drive_type: u32, accessible: bool, last_error: u32) -> VolumeHealth {
    match (drive_type, accessible) {
        (DRIVE_UNKNOWN, _) => VolumeHealth::Unknown,
        (DRIVE_NO_ROOT_DIR, _) => VolumeHealth::Unavailable,
        (_, true) => VolumeHealth::Healthy,
        (DRIVE_REMOVABLE, false) => VolumeHealth::Disconnected,
        (DRIVE_REMOTE, false) if last_error == ERROR_NOT_CONNECTED => VolumeHealth::Disconnected,
        (DRIVE_CDROM, false) => VolumeHealth::NoMedia,
        (DRIVE_FIXED | DRIVE_REMOTE | DRIVE_RAMDISK, false) => VolumeHealth::Error,
        _ => VolumeHealth::Unknown,
    }
}

/// List the root of `root`; blocks for as long as the drive does
fn probe_root(root: &str) -> VolumeHealth {
    let pattern = wide(format!("{}*", root));
    let mut data = WIN32_FIND_DATAW::default();
    // SAFETY: pattern is NUL-terminated and data outlives the call
    let found = unsafe {
        FindFirstFileExW(
            PCWSTR(pattern.as_ptr()),
            FindExInfoBasic,
            &mut data as *mut WIN32_FIND_DATAW as *mut _,
            FindExSearchNameMatch,
            None,
            FIND_FIRST_EX_LARGE_FETCH,
        )
    };

    match found {
        Ok(handle) => {
            // SAFETY: the handle was just opened and is closed once by the guard
            drop(unsafe { Owned::from_owned(FindHandle(handle)) });
            VolumeHealth::Healthy
        }
        Err(e) => {
            let code = win32_code(&e);
            debug!("[windows] FindFirstFileExW {} failed: {}", root, code);
            health_from_error(code)
        }
    }
}

/// Health probe bounded by `timeout_ms`
async fn check_health(root: String, timeout_ms: u64) -> VolumeHealth {
    let operation = format!("health probe {}", root);
    match watchdog(&operation, timeout_ms, move || Ok(probe_root(&root))).await {
        Ok(health) => health,
        Err(e) if e.is_timeout() => VolumeHealth::Timeout,
        Err(e) => {
            warn!("[windows] {}: {}", operation, e);
            VolumeHealth::Unknown
        }
    }
}

fn drive_type(root: &str) -> u32 {
    let root = wide(root);
    // SAFETY: root is NUL-terminated
    unsafe { GetDriveTypeW(PCWSTR(root.as_ptr())) }
}

struct VolumeInfo {
    label: String,
    fstype: String,
    serial: u32,
    flags: u32,
}

fn volume_information(root: &str) -> Result<VolumeInfo> {
    let wroot = wide(root);
    let mut label = [0u16; MAX_PATH + 1];
    let mut fstype = [0u16; MAX_PATH + 1];
    let mut serial = 0u32;
    let mut max_component = 0u32;
    let mut flags = 0u32;

    // SAFETY: every out pointer refers to a live local
    unsafe {
        GetVolumeInformationW(
            PCWSTR(wroot.as_ptr()),
            Some(&mut label),
            Some(&mut serial as *mut u32),
            Some(&mut max_component as *mut u32),
            Some(&mut flags as *mut u32),
            Some(&mut fstype),
        )
    }
    .map_err(|e| Error::native(format!("GetVolumeInformationW {}", root), to_io(&e)))?;

    Ok(VolumeInfo {
        label: from_wide(&label),
        fstype: from_wide(&fstype),
        serial,
        flags,
    })
}

/// UNC source of a mapped drive, from its `X:` device name
fn network_connection(root: &str) -> Result<String> {
    let device = wide(root.get(..2).unwrap_or(root));
    let mut length = MAX_PATH as u32;

    loop {
        let mut buffer = vec![0u16; length as usize];
        // SAFETY: buffer holds `length` elements and both pointers are live
        let status =
            unsafe { WNetGetConnectionW(device.as_ptr(), buffer.as_mut_ptr(), &mut length) };
        match status {
            0 => return Ok(from_wide(&buffer)),
            ERROR_MORE_DATA if length as usize > buffer.len() => continue,
            code => {
                return Err(Error::native(
                    format!("WNetGetConnectionW {}", root),
                    io::Error::from_raw_os_error(code as i32),
                ))
            }
        }
    }
}

/// Drive letter root hosting the Windows directory, such as `C:\`
fn windows_drive() -> Option<String> {
    let mut buffer = [0u16; MAX_PATH + 1];
    // SAFETY: the buffer length is passed with the slice
    let len = unsafe { GetWindowsDirectoryW(Some(&mut buffer)) } as usize;
    if len < 2 || len > buffer.len() {
        return None;
    }
    let dir = from_wide(&buffer[..len]);
    dir.get(..2).map(normalize_windows_path)
}

/// Whether the drive hosts the OS or advertises system volume flags
fn is_system_drive(root: &str, info: Option<&VolumeInfo>) -> bool {
    if windows_drive().is_some_and(|d| d.eq_ignore_ascii_case(root)) {
        return true;
    }
    info.is_some_and(|i| {
        i.flags & (FILE_SUPPORTS_SYSTEM_PATHS | FILE_SUPPORTS_SYSTEM_FILES) != 0
    })
}

/// Logical drive roots (`C:\`, `D:\`, ...)
fn logical_drives() -> Result<Vec<String>> {
    // SAFETY: a None buffer only queries the required length
    let needed = unsafe { GetLogicalDriveStringsW(None) } as usize;
    if needed == 0 {
        return Err(Error::last_os_error("GetLogicalDriveStringsW"));
    }

    let mut buffer = vec![0u16; needed + 1];
    // SAFETY: the buffer length is passed with the slice
    let written = unsafe { GetLogicalDriveStringsW(Some(&mut buffer)) } as usize;
    if written == 0 || written > buffer.len() {
        return Err(Error::last_os_error("GetLogicalDriveStringsW"));
    }

    Ok(buffer[..written]
        .split(|&c| c == 0)
        .filter(|s| !s.is_empty())
        .map(|s| normalize_windows_path(&String::from_utf16_lossy(s)))
        .collect())
}

/// Drives worth reporting, with their file system type and system hint
fn list_drives() -> Result<Vec<MountPoint>> {
    let mut mounts = Vec::new();
    for root in logical_drives()? {
        let kind = drive_type(&root);
        let info = volume_information(&root);

        if kind == DRIVE_REMOTE {
            if let Err(e) = network_connection(&root) {
                debug!("[windows] skipping unmapped network drive {}: {}", root, e);
                continue;
            }
        } else if let Err(e) = &info {
            debug!("[windows] skipping {}: {}", root, e);
            continue;
        }

        let info = info.ok();
        let mut mp = MountPoint::new(root.as_str(), info.as_ref().map(|i| i.fstype.clone()));
        mp.is_system_volume = is_system_drive(&root, info.as_ref());
        mounts.push(mp);
    }
    Ok(mounts)
}

pub async fn mount_points(config: &Config) -> Result<Vec<MountPoint>> {
    let drives = offload("GetLogicalDriveStringsW", list_drives).await?;
    let timeout_ms = config.timeout_ms;

    let probed = map_concurrent(drives, config.max_concurrency, move |mut mp| async move {
        mp.status = Some(check_health(mp.mount_point.clone(), timeout_ms).await);
        Ok(mp)
    })
    .await?;

    probed.into_iter().collect()
}

pub async fn volume_metadata(mount_point: &str, _config: &Config) -> Result<VolumeMetadata> {
    validate_path(Path::new(mount_point))?;
    let root = normalize_windows_path(mount_point);
    offload("GetVolumeInformationW", move || read_volume_metadata(&root)).await
}

fn root_accessible(root: &str) -> (bool, u32) {
    let wroot = wide(root);
    // SAFETY: wroot is NUL-terminated
    let attrs = unsafe { GetFileAttributesW(PCWSTR(wroot.as_ptr())) };
    if attrs == INVALID_FILE_ATTRIBUTES {
        let code = io::Error::last_os_error().raw_os_error().unwrap_or(0) as u32;
        (false, code)
    } else {
        (true, 0)
    }
}

fn read_volume_metadata(root: &str) -> Result<VolumeMetadata> {
    let kind = drive_type(root);
    let (accessible, last_error) = root_accessible(root);
    let status = drive_status(kind, accessible, last_error);

    if matches!(
        status,
        VolumeHealth::Disconnected
            | VolumeHealth::Unavailable
            | VolumeHealth::Error
            | VolumeHealth::NoMedia
    ) {
        return Err(Error::NotAccessible {
            path: root.into(),
            source: io::Error::new(
                io::ErrorKind::NotConnected,
                format!("volume is {}", status),
            ),
        });
    }

    let info = volume_information(root)?;
    let mut md = VolumeMetadata::new(root);
    md.status = Some(status);
    md.label = Some(info.label.clone()).filter(|l| !l.is_empty());
    md.fstype = Some(info.fstype.clone()).filter(|t| !t.is_empty());
    md.uuid = Some(format!("{:08X}", info.serial));
    md.is_system_volume = is_system_drive(root, Some(&info));

    let wroot = wide(root);
    let mut available = 0u64;
    let mut total = 0u64;
    let mut free = 0u64;
    // SAFETY: every out pointer refers to a live local
    unsafe {
        GetDiskFreeSpaceExW(
            PCWSTR(wroot.as_ptr()),
            Some(&mut available as *mut u64),
            Some(&mut total as *mut u64),
            Some(&mut free as *mut u64),
        )
    }
    .map_err(|e| Error::native(format!("GetDiskFreeSpaceExW {}", root), to_io(&e)))?;

    md.size = total;
    md.available = available;
    md.used = total.saturating_sub(free);

    if kind == DRIVE_REMOTE {
        md.remote = true;
        match network_connection(root) {
            Ok(source) => {
                if let Some(unc) = parse_remote_path(&source) {
                    md.remote_host = Some(unc.remote_host);
                    md.remote_share = Some(unc.remote_share);
                }
                md.protocol = Some("smb".to_string());
                md.mount_from = Some(source);
            }
            Err(e) => md.degrade(e.to_string()),
        }
    }

    Ok(md)
}

pub fn read_hidden_flag(path: &Path) -> Result<bool> {
    let wpath = wide(path);
    // SAFETY: wpath is NUL-terminated
    let attrs = unsafe { GetFileAttributesW(PCWSTR(wpath.as_ptr())) };
    if attrs == INVALID_FILE_ATTRIBUTES {
        return Err(Error::from_path_io(
            "GetFileAttributesW",
            path,
            io::Error::last_os_error(),
        ));
    }
    Ok(attrs & FILE_ATTRIBUTE_HIDDEN.0 != 0)
}

pub fn write_hidden_flag(path: &Path, hidden: bool) -> Result<()> {
    let wpath = wide(path);
    // SAFETY: wpath is NUL-terminated
    let attrs = unsafe { GetFileAttributesW(PCWSTR(wpath.as_ptr())) };
    if attrs == INVALID_FILE_ATTRIBUTES {
        return Err(Error::from_path_io(
            "GetFileAttributesW",
            path,
            io::Error::last_os_error(),
        ));
    }

    let mut updated = if hidden {
        attrs | FILE_ATTRIBUTE_HIDDEN.0
    } else {
        attrs & !FILE_ATTRIBUTE_HIDDEN.0
    };
    if updated == 0 {
        updated = FILE_ATTRIBUTE_NORMAL.0;
    }
    if updated == attrs {
        return Ok(());
    }

    // SAFETY: wpath is NUL-terminated
    unsafe { SetFileAttributesW(PCWSTR(wpath.as_ptr()), FILE_FLAGS_AND_ATTRIBUTES(updated)) }
        .map_err(|e| Error::from_path_io("SetFileAttributesW", path, to_io(&e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_from_error() {
        assert_eq!(health_from_error(ERROR_ACCESS_DENIED), VolumeHealth::Inaccessible);
        assert_eq!(health_from_error(ERROR_LOGON_FAILURE), VolumeHealth::Inaccessible);
        assert_eq!(health_from_error(ERROR_BAD_NETPATH), VolumeHealth::Disconnected);
        assert_eq!(health_from_error(ERROR_NOT_CONNECTED), VolumeHealth::Disconnected);
        assert_eq!(health_from_error(31), VolumeHealth::Unknown);
    }

    #[test]
    fn test_drive_status() {
        assert_eq!(drive_status(DRIVE_FIXED, true, 0), VolumeHealth::Healthy);
        assert_eq!(drive_status(DRIVE_FIXED, false, 5), VolumeHealth::Error);
        assert_eq!(drive_status(DRIVE_CDROM, false, 21), VolumeHealth::NoMedia);
        assert_eq!(drive_status(DRIVE_REMOVABLE, false, 21), VolumeHealth::Disconnected);
        assert_eq!(
            drive_status(DRIVE_REMOTE, false, ERROR_NOT_CONNECTED),
            VolumeHealth::Disconnected
        );
        assert_eq!(drive_status(DRIVE_REMOTE, false, 53), VolumeHealth::Error);
        assert_eq!(drive_status(DRIVE_NO_ROOT_DIR, true, 0), VolumeHealth::Unavailable);
        assert_eq!(drive_status(DRIVE_UNKNOWN, true, 0), VolumeHealth::Unknown);
    }

    #[test]
    fn test_wide_round_trip() {
        let w = wide("C:\\Données");
        assert_eq!(w.last(), Some(&0));
        assert_eq!(from_wide(&w), "C:\\Données");
    }

    #[tokio::test]
    async fn test_system_drive_metadata() {
        let root = windows_drive().unwrap();
        let md = volume_metadata(&root, &Config::default()).await.unwrap();
        assert_eq!(md.mount_point, root);
        assert!(md.is_system_volume);
        assert!(md.size > 0);
        assert!(md.available <= md.size);
        assert_eq!(md.uuid.as_deref().map(str::len), Some(8));
    }

    #[tokio::test]
    async fn test_mount_points_include_system_drive() {
        let root = windows_drive().unwrap();
        let mounts = mount_points(&Config::default()).await.unwrap();
        let system = mounts.iter().find(|m| m.mount_point == root).unwrap();
        assert!(system.is_system_volume);
        assert_eq!(system.status, Some(VolumeHealth::Healthy));
    }

    #[test]
    fn test_hidden_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        assert!(!read_hidden_flag(&file).unwrap());
        write_hidden_flag(&file, true).unwrap();
        assert!(read_hidden_flag(&file).unwrap());
        write_hidden_flag(&file, false).unwrap();
        assert!(!read_hidden_flag(&file).unwrap());
    }

    #[test]
    fn test_missing_path_not_accessible() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_hidden_flag(&dir.path().join("absent")),
            Err(Error::NotAccessible { .. })
        ));
    }
}
