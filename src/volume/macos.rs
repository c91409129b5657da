//! macOS backend
//!
//! Enumeration uses `getmntinfo_r_np`, the thread-safe variant of
//! `getmntinfo`. Metadata comes from `fstatvfs`/`fstatfs` on an open
//! directory, then label, UUID and volume path are added from Disk
//! Arbitration.
//!
//! Disk Arbitration sessions are not safe for concurrent use. All session
//! work runs under one process-wide mutex, with the session scheduled on a
//! private dispatch queue for the duration and unscheduled before release.

use super::capacity;
use super::types::{HiddenSupport, MountPoint, VolumeHealth, VolumeMetadata};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::guard::{ForeignHandle, Owned};
use crate::path::{normalize_posix_path, validate_path};
use crate::remote::parse_remote_spec;
use crate::timeout::offload;
use log::{debug, warn};
use nix::sys::statvfs::fstatvfs;
use std::ffi::{c_char, c_int, c_long, c_void, CStr, CString};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::macos::fs::MetadataExt;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

/// Both mechanisms: dot files and the `UF_HIDDEN` flag
pub const HIDDEN_SUPPORT: HiddenSupport = HiddenSupport {
    dot_prefix: true,
    system_flag: true,
};

/// `UF_HIDDEN` from `<sys/stat.h>`
const UF_HIDDEN: u32 = 0x0000_8000;

/// Filesystems served over the network; Disk Arbitration has nothing to add
const NETWORK_FS_TYPES: &[&str] = &["smbfs", "nfs", "afpfs", "webdav"];

type CFTypeRef = *const c_void;
type CFAllocatorRef = *const c_void;
type CFStringRef = *const c_void;
type CFDictionaryRef = *const c_void;
type CFUUIDRef = *const c_void;
type CFURLRef = *const c_void;
type CFBooleanRef = *const c_void;
type CFIndex = c_long;
type CFTypeID = usize;
type DASessionRef = *mut c_void;
type DADiskRef = *mut c_void;
type DispatchQueueRef = *mut c_void;

const K_CF_STRING_ENCODING_UTF8: u32 = 0x0800_0100;
const K_CF_URL_POSIX_PATH_STYLE: CFIndex = 0;

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    static kCFAllocatorDefault: CFAllocatorRef;

    fn CFRelease(cf: CFTypeRef);
    fn CFGetTypeID(cf: CFTypeRef) -> CFTypeID;
    fn CFStringGetTypeID() -> CFTypeID;
    fn CFBooleanGetTypeID() -> CFTypeID;
    fn CFDictionaryGetValue(dict: CFDictionaryRef, key: *const c_void) -> *const c_void;
    fn CFStringGetLength(string: CFStringRef) -> CFIndex;
    fn CFStringGetMaximumSizeForEncoding(length: CFIndex, encoding: u32) -> CFIndex;
    fn CFStringGetCString(
        string: CFStringRef,
        buffer: *mut c_char,
        buffer_size: CFIndex,
        encoding: u32,
    ) -> u8;
    fn CFBooleanGetValue(boolean: CFBooleanRef) -> u8;
    fn CFUUIDCreateString(alloc: CFAllocatorRef, uuid: CFUUIDRef) -> CFStringRef;
    fn CFURLCopyFileSystemPath(url: CFURLRef, style: CFIndex) -> CFStringRef;
}

#[link(name = "DiskArbitration", kind = "framework")]
extern "C" {
    static kDADiskDescriptionVolumeNameKey: CFStringRef;
    static kDADiskDescriptionVolumeUUIDKey: CFStringRef;
    static kDADiskDescriptionVolumeNetworkKey: CFStringRef;
    static kDADiskDescriptionVolumePathKey: CFStringRef;

    fn DASessionCreate(alloc: CFAllocatorRef) -> DASessionRef;
    fn DASessionSetDispatchQueue(session: DASessionRef, queue: DispatchQueueRef);
    fn DADiskCreateFromBSDName(
        alloc: CFAllocatorRef,
        session: DASessionRef,
        name: *const c_char,
    ) -> DADiskRef;
    fn DADiskCopyDescription(disk: DADiskRef) -> CFDictionaryRef;
}

extern "C" {
    fn dispatch_queue_create(label: *const c_char, attr: *const c_void) -> DispatchQueueRef;
    fn getmntinfo_r_np(mntbufp: *mut *mut libc::statfs, flags: c_int) -> c_int;
}

/// Any Core Foundation object, including DA sessions and disks
#[derive(Debug, Clone, Copy)]
struct CfRef(CFTypeRef);

unsafe impl ForeignHandle for CfRef {
    const RELEASE: &'static str = "CFRelease";

    fn is_null(&self) -> bool {
        self.0.is_null()
    }

    unsafe fn release(self) {
        CFRelease(self.0)
    }
}

/// Buffer `malloc`ed by `getmntinfo_r_np`
#[derive(Debug, Clone, Copy)]
struct MountBuffer(*mut libc::statfs);

unsafe impl ForeignHandle for MountBuffer {
    const RELEASE: &'static str = "free";

    fn is_null(&self) -> bool {
        self.0.is_null()
    }

    unsafe fn release(self) {
        libc::free(self.0.cast())
    }
}

/// Private serial queue that DA sessions are scheduled on
struct DaContext {
    queue: DispatchQueueRef,
}

// SAFETY: a dispatch queue may be used from any thread; access is serialized
// by the mutex in `da_context` anyway.
unsafe impl Send for DaContext {}

fn da_context() -> &'static Mutex<DaContext> {
    static CONTEXT: OnceLock<Mutex<DaContext>> = OnceLock::new();
    CONTEXT.get_or_init(|| {
        // SAFETY: the label is a valid C string; a null attr requests a serial queue.
        let queue =
            unsafe { dispatch_queue_create(c"volmeta.diskarbitration".as_ptr(), std::ptr::null()) };
        Mutex::new(DaContext { queue })
    })
}

/// Keeps a session scheduled on the context queue; unschedules on drop
struct ScheduledSession<'a> {
    session: &'a Owned<CfRef>,
}

impl<'a> ScheduledSession<'a> {
    fn new(session: &'a Owned<CfRef>, context: &DaContext) -> Self {
        // SAFETY: both the session and the queue are live
        unsafe { DASessionSetDispatchQueue(session.get().0 as DASessionRef, context.queue) };
        Self { session }
    }
}

impl Drop for ScheduledSession<'_> {
    fn drop(&mut self) {
        // SAFETY: the session outlives this guard
        unsafe {
            DASessionSetDispatchQueue(self.session.get().0 as DASessionRef, std::ptr::null_mut())
        };
    }
}

pub async fn mount_points(_config: &Config) -> Result<Vec<MountPoint>> {
    offload("getmntinfo_r_np", list_mount_points).await
}

pub async fn volume_metadata(mount_point: &str, _config: &Config) -> Result<VolumeMetadata> {
    let mount_point = mount_point.to_string();
    offload("fstatvfs", move || read_volume_metadata(&mount_point)).await
}

fn list_mount_points() -> Result<Vec<MountPoint>> {
    let mut buffer: *mut libc::statfs = std::ptr::null_mut();
    // SAFETY: on success the buffer is ours and must be freed with free(3)
    let count = unsafe { getmntinfo_r_np(&mut buffer, libc::MNT_NOWAIT) };
    let buffer = unsafe { Owned::from_owned(MountBuffer(buffer)) };

    let buffer = match buffer {
        Some(buffer) if count > 0 => buffer,
        _ => return Err(Error::last_os_error("getmntinfo_r_np")),
    };

    // SAFETY: getmntinfo_r_np filled `count` entries
    let entries = unsafe { std::slice::from_raw_parts(buffer.get().0, count as usize) };
    let mounts = entries
        .iter()
        .map(|fs| {
            MountPoint::new(
                normalize_posix_path(&c_chars(&fs.f_mntonname)),
                Some(c_chars(&fs.f_fstypename)),
            )
        })
        .collect::<Vec<_>>();

    debug!("[macos] {} mount points", mounts.len());
    Ok(mounts)
}

fn c_chars(chars: &[c_char]) -> String {
    // SAFETY: statfs name fields are NUL terminated within their arrays
    unsafe { CStr::from_ptr(chars.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn read_volume_metadata(mount_point: &str) -> Result<VolumeMetadata> {
    validate_path(Path::new(mount_point))?;
    let mount_point = normalize_posix_path(mount_point);
    let dir = open_dir(&mount_point)?;

    let vfs = fstatvfs(&dir)
        .map_err(|e| Error::from_path_io("fstatvfs", &mount_point, io::Error::from(e)))?;
    let (size, used, available) = capacity(
        vfs.fragment_size() as u64,
        vfs.block_size() as u64,
        vfs.blocks() as u64,
        vfs.blocks_free() as u64,
        vfs.blocks_available() as u64,
    )?;

    // SAFETY: zeroed statfs is a valid out-parameter
    let mut fs: libc::statfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstatfs(dir.as_raw_fd(), &mut fs) } != 0 {
        return Err(Error::from_path_io(
            "fstatfs",
            &mount_point,
            io::Error::last_os_error(),
        ));
    }

    let mut md = VolumeMetadata::new(mount_point.clone());
    md.size = size;
    md.used = used;
    md.available = available;
    md.fstype = Some(c_chars(&fs.f_fstypename));
    md.mount_from = Some(c_chars(&fs.f_mntfromname));
    md.mount_name = Some(c_chars(&fs.f_mntonname));
    md.status = Some(VolumeHealth::Healthy);

    let fstype = md.fstype.clone().unwrap_or_default();
    if NETWORK_FS_TYPES.contains(&fstype.as_str()) {
        md.remote = true;
        if let Some(info) = md
            .mount_from
            .as_deref()
            .and_then(|from| parse_remote_spec(from, Some(&fstype)))
        {
            md.apply_remote(info);
        }
        return Ok(md);
    }

    let bsd_name = md
        .mount_from
        .as_deref()
        .unwrap_or_default()
        .trim_start_matches("/dev/")
        .to_string();
    match describe_disk(&bsd_name) {
        Ok(disk) => {
            md.label = disk.label;
            md.uuid = disk.uuid;
            md.remote = disk.network;
            match disk.volume_path {
                Some(path) => md.uri = Some(path),
                None => md.degrade("volume path unavailable"),
            }
        }
        Err(e) => {
            warn!("[macos] Disk Arbitration failed for {}: {}", mount_point, e);
            md.degrade(e.to_string());
        }
    }

    debug!(
        "[macos] {} {{size: {}, available: {}, used: {}}}",
        mount_point, md.size, md.available, md.used
    );
    Ok(md)
}

fn open_dir(path: &str) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(path)
        .map_err(|e| Error::from_path_io("open", path, e))
}

#[derive(Debug, Default)]
struct DiskDescription {
    label: Option<String>,
    uuid: Option<String>,
    network: bool,
    volume_path: Option<String>,
}

fn describe_disk(bsd_name: &str) -> Result<DiskDescription> {
    let name = CString::new(bsd_name)
        .map_err(|_| Error::Validation(format!("invalid BSD name '{}'", bsd_name)))?;

    let context = da_context()
        .lock()
        .map_err(|e| Error::Task(format!("Disk Arbitration context poisoned: {}", e)))?;

    // SAFETY: every Create/Copy result is wrapped in `Owned` immediately and
    // released by it; Get results are borrowed only while their owner lives.
    unsafe {
        let session = Owned::from_owned(CfRef(DASessionCreate(kCFAllocatorDefault)))
            .ok_or_else(|| Error::last_os_error("DASessionCreate"))?;
        let _scheduled = ScheduledSession::new(&session, &context);

        let disk = Owned::from_owned(CfRef(DADiskCreateFromBSDName(
            kCFAllocatorDefault,
            session.get().0 as DASessionRef,
            name.as_ptr(),
        )))
        .ok_or_else(|| Error::Unsupported(format!("no disk object for {}", bsd_name)))?;

        let description = Owned::from_owned(CfRef(DADiskCopyDescription(disk.get().0 as DADiskRef)))
            .ok_or_else(|| Error::Unsupported(format!("no description for {}", bsd_name)))?;
        let dict = description.get().0;

        let mut out = DiskDescription::default();

        let name = CFDictionaryGetValue(dict, kDADiskDescriptionVolumeNameKey);
        if !name.is_null() && CFGetTypeID(name) == CFStringGetTypeID() {
            out.label = cf_string(name);
        }

        let uuid = CFDictionaryGetValue(dict, kDADiskDescriptionVolumeUUIDKey);
        if !uuid.is_null() {
            if let Some(text) = Owned::from_owned(CfRef(CFUUIDCreateString(kCFAllocatorDefault, uuid))) {
                out.uuid = cf_string(text.get().0);
            }
        }

        let network = CFDictionaryGetValue(dict, kDADiskDescriptionVolumeNetworkKey);
        if !network.is_null() && CFGetTypeID(network) == CFBooleanGetTypeID() {
            out.network = CFBooleanGetValue(network) != 0;
        }

        let url = CFDictionaryGetValue(dict, kDADiskDescriptionVolumePathKey);
        if !url.is_null() {
            if let Some(path) =
                Owned::from_owned(CfRef(CFURLCopyFileSystemPath(url, K_CF_URL_POSIX_PATH_STYLE)))
            {
                out.volume_path = cf_string(path.get().0);
            }
        }

        Ok(out)
    }
}

/// Copy a CFString out as UTF-8
///
/// # Safety
///
/// `string` must be a live CFStringRef.
unsafe fn cf_string(string: CFStringRef) -> Option<String> {
    let length = CFStringGetLength(string);
    let capacity = CFStringGetMaximumSizeForEncoding(length, K_CF_STRING_ENCODING_UTF8) + 1;
    let mut buffer = vec![0 as c_char; usize::try_from(capacity).ok()?];
    if CFStringGetCString(string, buffer.as_mut_ptr(), capacity, K_CF_STRING_ENCODING_UTF8) == 0 {
        return None;
    }
    Some(CStr::from_ptr(buffer.as_ptr()).to_string_lossy().into_owned())
}

/// `UF_HIDDEN` state of an existing path
pub fn read_hidden_flag(path: &Path) -> Result<bool> {
    let metadata = fs::metadata(path).map_err(|e| Error::from_path_io("stat", path, e))?;
    Ok(metadata.st_flags() & UF_HIDDEN != 0)
}

/// Set or clear `UF_HIDDEN`, keeping the other flags
pub fn write_hidden_flag(path: &Path, hidden: bool) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|e| Error::from_path_io("stat", path, e))?;
    let flags = if hidden {
        metadata.st_flags() | UF_HIDDEN
    } else {
        metadata.st_flags() & !UF_HIDDEN
    };

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::Validation(format!("path contains a NUL byte: {}", path.display())))?;
    // SAFETY: c_path is a valid NUL-terminated path
    if unsafe { libc::chflags(c_path.as_ptr(), flags as _) } != 0 {
        return Err(Error::from_path_io(
            "chflags",
            path,
            io::Error::last_os_error(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_includes_root() {
        let mounts = list_mount_points().unwrap();
        assert!(mounts.iter().any(|m| m.mount_point == "/"));
    }

    #[test]
    fn test_root_metadata() {
        let md = read_volume_metadata("/").unwrap();
        assert!(md.size > 0);
        assert!(md.available <= md.size);
        assert!(md.fstype.is_some());
        assert_eq!(md.mount_name.as_deref(), Some("/"));
    }

    #[test]
    fn test_missing_mount_point() {
        assert!(matches!(
            read_volume_metadata("/nonexistent/volmeta"),
            Err(Error::NotAccessible { .. })
        ));
    }

    #[test]
    fn test_hidden_flag_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("flagged");
        fs::write(&file, "x").unwrap();

        assert!(!read_hidden_flag(&file).unwrap());
        write_hidden_flag(&file, true).unwrap();
        assert!(read_hidden_flag(&file).unwrap());
        write_hidden_flag(&file, false).unwrap();
        assert!(!read_hidden_flag(&file).unwrap());
    }

    #[test]
    fn test_concurrent_disk_arbitration() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| read_volume_metadata("/")))
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let first = results[0].as_ref().unwrap();
        for md in &results {
            let md = md.as_ref().unwrap();
            assert_eq!(md.uuid, first.uuid);
            assert_eq!(md.label, first.label);
            assert_eq!(md.size, first.size);
        }
    }
}
