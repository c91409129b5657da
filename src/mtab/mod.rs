//! Linux mount table (`/proc/mounts`, `/etc/mtab`) parsing
//!
//! Format, one mount per line:
//!
//! ```text
//! spec  mountpoint  vfstype  [options  [freq  [passno]]]
//! ```
//!
//! Columns are whitespace separated and octal-escaped (see [`escape`]).

pub mod escape;

use crate::error::{Error, Result};
use crate::path::normalize_posix_path;
use crate::remote::parse_remote_spec;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// fstab(5) placeholder for a missing filesystem type; reads back as absent
pub const NO_TYPE: &str = "none";

/// fstab(5) placeholder for missing options; reads back as absent
pub const DEFAULT_OPTIONS: &str = "defaults";

/// One parsed mount-table line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MtabEntry {
    /// Mounted device or remote source
    pub fs_spec: String,
    /// Mount point, decoded and without trailing slashes
    pub fs_file: String,
    /// Filesystem type
    pub fs_vfstype: Option<String>,
    /// Comma-separated mount options
    pub fs_mntops: Option<String>,
    /// dump(8) frequency, 0 when absent
    pub fs_freq: u32,
    /// fsck(8) pass number, 0 when absent
    pub fs_passno: u32,
    /// Present when `fs_spec` names a remote share
    #[serde(rename = "protocol", skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(rename = "remoteUser", skip_serializing_if = "Option::is_none")]
    pub remote_user: Option<String>,
    #[serde(rename = "remoteHost", skip_serializing_if = "Option::is_none")]
    pub remote_host: Option<String>,
    #[serde(rename = "remoteShare", skip_serializing_if = "Option::is_none")]
    pub remote_share: Option<String>,
}

impl MtabEntry {
    /// Build an entry, deriving remote identity from `fs_spec`
    pub fn new(
        fs_spec: impl Into<String>,
        fs_file: impl Into<String>,
        fs_vfstype: Option<String>,
        fs_mntops: Option<String>,
        fs_freq: u32,
        fs_passno: u32,
    ) -> Self {
        let fs_spec = fs_spec.into();
        let remote = parse_remote_spec(&fs_spec, fs_vfstype.as_deref());
        let (protocol, remote_user, remote_host, remote_share) = match remote {
            Some(info) => (
                info.protocol,
                info.remote_user,
                info.remote_host,
                info.remote_share,
            ),
            None => (None, None, None, None),
        };
        Self {
            fs_spec,
            fs_file: normalize_posix_path(&fs_file.into()),
            fs_vfstype,
            fs_mntops,
            fs_freq,
            fs_passno,
            protocol,
            remote_user,
            remote_host,
            remote_share,
        }
    }

    /// Whether the source is a remote share
    pub fn is_remote(&self) -> bool {
        self.remote_host.is_some()
    }
}

/// Parse mount-table text
///
/// Blank lines, `#` comments and lines without both a spec and a mount point
/// are skipped. A malformed escape anywhere fails the whole parse. The
/// [`NO_TYPE`] and [`DEFAULT_OPTIONS`] placeholders parse as absent columns.
pub fn parse(content: &str) -> Result<Vec<MtabEntry>> {
    let mut entries = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }

        let fs_spec = escape::decode(fields[0])?;
        let fs_file = escape::decode(fields[1])?;
        let fs_vfstype = optional_column(fields.get(2), NO_TYPE)?;
        let fs_mntops = optional_column(fields.get(3), DEFAULT_OPTIONS)?;
        let fs_freq = parse_number(fields.get(4))?;
        let fs_passno = parse_number(fields.get(5))?;

        entries.push(MtabEntry::new(
            fs_spec, fs_file, fs_vfstype, fs_mntops, fs_freq, fs_passno,
        ));
    }

    Ok(entries)
}

fn optional_column(field: Option<&&str>, placeholder: &str) -> Result<Option<String>> {
    Ok(field
        .map(|s| escape::decode(s))
        .transpose()?
        .filter(|value| value != placeholder))
}

fn parse_number(field: Option<&&str>) -> Result<u32> {
    match field {
        None => Ok(0),
        Some(s) => s
            .parse()
            .map_err(|_| Error::Validation(format!("non-numeric mount table column '{}'", s))),
    }
}

/// Render entries as tab-separated lines that [`parse`] reads back unchanged
///
/// An entry with no type, no options and zero numbers is written as two
/// columns. Otherwise all six are written, with a missing type or option list
/// filled by its placeholder.
pub fn format(entries: &[MtabEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let spec = escape::encode(&entry.fs_spec);
        let file = escape::encode(&entry.fs_file);
        let bare = entry.fs_vfstype.is_none()
            && entry.fs_mntops.is_none()
            && entry.fs_freq == 0
            && entry.fs_passno == 0;

        if bare {
            out.push_str(&format!("{}\t{}\n", spec, file));
            continue;
        }

        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            spec,
            file,
            escape::encode(entry.fs_vfstype.as_deref().unwrap_or(NO_TYPE)),
            escape::encode(entry.fs_mntops.as_deref().unwrap_or(DEFAULT_OPTIONS)),
            entry.fs_freq,
            entry.fs_passno,
        ));
    }
    out
}

/// Read and parse the first candidate table that can be read
///
/// Returns the entries with the path they came from.
pub fn read_first_readable<P: AsRef<Path>>(candidates: &[P]) -> Result<(PathBuf, Vec<MtabEntry>)> {
    let mut last_err = None;

    for candidate in candidates {
        let path = candidate.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => {
                debug!("[mtab] reading {}", path.display());
                return Ok((path.to_path_buf(), parse(&content)?));
            }
            Err(e) => {
                debug!("[mtab] skipping {}: {}", path.display(), e);
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(Error::native("read mount table", e)),
        None => Err(Error::Validation(
            "no mount table paths configured".to_string(),
        )),
    }
}

/// Entry for `mount_point`; the last match wins, as later mounts shadow
/// earlier ones
pub fn find_entry<'a>(entries: &'a [MtabEntry], mount_point: &str) -> Option<&'a MtabEntry> {
    let target = normalize_posix_path(mount_point);
    entries.iter().rev().find(|e| e.fs_file == target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_nfs_line() {
        let entries = parse("nfs-server:/export /mnt/nfs nfs rw,vers=4.1 0 0").unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.fs_spec, "nfs-server:/export");
        assert_eq!(e.fs_file, "/mnt/nfs");
        assert_eq!(e.fs_vfstype.as_deref(), Some("nfs"));
        assert_eq!(e.fs_mntops.as_deref(), Some("rw,vers=4.1"));
        assert_eq!(e.fs_freq, 0);
        assert_eq!(e.fs_passno, 0);
        assert_eq!(e.protocol.as_deref(), Some("nfs"));
        assert_eq!(e.remote_host.as_deref(), Some("nfs-server"));
        assert_eq!(e.remote_share.as_deref(), Some("export"));
        assert!(e.is_remote());
    }

    #[test]
    fn test_parse_skips_comments_blanks_and_short_lines() {
        let content = "\
# comment
   \t# indented comment

lonely
/dev/sda1 / ext4 rw,relatime 0 1
";
        let entries = parse(content).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fs_file, "/");
        assert_eq!(entries[0].fs_passno, 1);
        assert!(!entries[0].is_remote());
    }

    #[test]
    fn test_parse_optional_columns_default() {
        let entries = parse("/dev/sdb1 /data").unwrap();
        assert_eq!(entries[0].fs_vfstype, None);
        assert_eq!(entries[0].fs_mntops, None);
        assert_eq!(entries[0].fs_freq, 0);
        assert_eq!(entries[0].fs_passno, 0);
    }

    #[test]
    fn test_parse_decodes_and_normalizes_mount_point() {
        let entries = parse("/dev/sdc1 /media/USB\\040Stick/ vfat rw 0 0").unwrap();
        assert_eq!(entries[0].fs_file, "/media/USB Stick");
    }

    #[test]
    fn test_parse_rejects_invalid_escape() {
        let result = parse("/dev/sdc1 /media/bad\\000 vfat rw 0 0");
        assert!(matches!(result, Err(Error::InvalidEscape(_))));
    }

    #[test]
    fn test_parse_smb_line() {
        let entries = parse("//nas/share /mnt/share cifs rw 0 0").unwrap();
        assert_eq!(entries[0].protocol.as_deref(), Some("cifs"));
        assert_eq!(entries[0].remote_host.as_deref(), Some("nas"));
        assert_eq!(entries[0].remote_share.as_deref(), Some("share"));
    }

    #[test]
    fn test_format_defaults_freq_and_passno() {
        let entry = MtabEntry::new("/dev/sda1", "/", Some("ext4".into()), Some("rw".into()), 0, 1);
        assert_eq!(format(&[entry]), "/dev/sda1\t/\text4\trw\t0\t1\n");
    }

    #[test]
    fn test_format_omits_absent_columns() {
        let entry = MtabEntry::new("/dev/sdb1", "/data", None, None, 0, 0);
        let text = format(std::slice::from_ref(&entry));
        assert_eq!(text, "/dev/sdb1\t/data\n");
        assert_eq!(parse(&text).unwrap(), vec![entry]);
    }

    #[test]
    fn test_placeholders_read_back_as_absent() {
        let entry = MtabEntry::new("/dev/sdb1", "/data", None, Some("ro".into()), 0, 2);
        let text = format(std::slice::from_ref(&entry));
        assert_eq!(text, "/dev/sdb1\t/data\tnone\tro\t0\t2\n");
        assert_eq!(parse(&text).unwrap(), vec![entry]);

        let entries = parse("/dev/sdb1 /data ext4 defaults 0 0").unwrap();
        assert_eq!(entries[0].fs_vfstype.as_deref(), Some("ext4"));
        assert_eq!(entries[0].fs_mntops, None);
    }

    #[test]
    fn test_find_entry_prefers_last_mount() {
        let entries = parse(
            "/dev/sda1 /mnt ext4 rw 0 0\n\
             /dev/sdb1 /mnt/ xfs rw 0 0\n",
        )
        .unwrap();
        let found = find_entry(&entries, "/mnt//").unwrap();
        assert_eq!(found.fs_spec, "/dev/sdb1");
    }

    #[test]
    fn test_read_first_readable_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("mounts");
        fs::write(&table, "/dev/sda1 / ext4 rw 0 0\n").unwrap();
        let missing = dir.path().join("missing");

        let (used, entries) = read_first_readable(&[missing, table.clone()]).unwrap();
        assert_eq!(used, table);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_read_first_readable_all_missing() {
        let result = read_first_readable(&["/nonexistent/volmeta/mtab"]);
        assert!(matches!(result, Err(Error::NativeCall { .. })));
    }

    fn field() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 \t._:@#\\\\-]{1,12}".prop_filter("non-blank", |s| !s.trim().is_empty())
    }

    fn entry() -> impl Strategy<Value = MtabEntry> {
        let vfstype = prop::option::of(field().prop_filter("placeholder", |s| s != NO_TYPE));
        let opts = prop::option::of(field().prop_filter("placeholder", |s| s != DEFAULT_OPTIONS));
        (field(), field(), vfstype, opts, 0u32..5, 0u32..3).prop_map(
            |(spec, file, vfstype, opts, freq, passno)| {
                MtabEntry::new(spec, format!("/{}", file), vfstype, opts, freq, passno)
            },
        )
    }

    proptest! {
        #[test]
        fn prop_parse_inverts_format(entries in prop::collection::vec(entry(), 0..6)) {
            prop_assert_eq!(parse(&format(&entries)).unwrap(), entries);
        }
    }
}
