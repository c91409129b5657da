//! Remote share identity
//!
//! Parses the forms a mount source takes for network volumes:
//! - UNC: `\\host\share` or `//host/share`
//! - NFS style: `host:/export/path`, optionally `user@host:/path`
//! - URL style: `smb://user@host/share`

use crate::volume::types::RemoteInfo;
use serde::{Deserialize, Serialize};

/// Characters Windows forbids in host and share names
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Filesystem types backed by a network service
const NETWORK_FS_TYPES: &[&str] = &[
    "nfs",
    "nfs4",
    "cifs",
    "smb",
    "smb2",
    "smb3",
    "smbfs",
    "ncpfs",
    "afs",
    "afpfs",
    "davfs",
    "webdav",
    "fuse.sshfs",
    "sshfs",
    "glusterfs",
    "fuse.glusterfs",
    "9p",
    "ceph",
    "fuse.ceph",
];

/// Host and share extracted from a UNC path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePath {
    pub remote_host: String,
    pub remote_share: String,
}

/// Parse `\\host\share[\...]` or `//host/share[/...]`
///
/// Returns `None` for single leading separators, a host or share holding the
/// other separator style, missing or blank segments and names containing
/// `< > : " | ? *`. Segments after the share are ignored, whatever separators
/// they use.
pub fn parse_remote_path(input: &str) -> Option<RemotePath> {
    let (sep, rest) = if let Some(rest) = input.strip_prefix("\\\\") {
        ('\\', rest)
    } else if let Some(rest) = input.strip_prefix("//") {
        ('/', rest)
    } else {
        return None;
    };

    let other = if sep == '\\' { '/' } else { '\\' };
    let mut segments = rest.split(sep);
    let host = segments.next()?;
    let share = segments.next()?;

    if !is_valid_segment(host, other) || !is_valid_segment(share, other) {
        return None;
    }

    Some(RemotePath {
        remote_host: host.to_string(),
        remote_share: share.to_string(),
    })
}

fn is_valid_segment(segment: &str, other_sep: char) -> bool {
    !segment.trim().is_empty()
        && !segment.contains(FORBIDDEN_CHARS)
        && !segment.contains(other_sep)
}

/// Whether `fstype` is served over the network
pub fn is_network_fs(fstype: &str) -> bool {
    let fstype = fstype.to_ascii_lowercase();
    NETWORK_FS_TYPES.contains(&fstype.as_str())
}

/// Derive remote identity from a mount source such as an mtab `fs_spec`
///
/// `fstype` refines the protocol when it names a network filesystem;
/// otherwise the protocol follows the matched form (`nfs` for `host:path`,
/// `smb` for UNC, the scheme for URLs). Returns `None` for local sources.
pub fn parse_remote_spec(spec: &str, fstype: Option<&str>) -> Option<RemoteInfo> {
    let typed_protocol = fstype
        .filter(|t| is_network_fs(t))
        .map(|t| t.trim_start_matches("fuse.").to_ascii_lowercase());

    if let Some((scheme, rest)) = split_url(spec) {
        let (authority, share) = match rest.split_once('/') {
            Some((authority, share)) => (authority, share),
            None => (rest, ""),
        };
        let (user, host) = split_user(authority);
        if host.is_empty() {
            return None;
        }
        return Some(RemoteInfo {
            uri: Some(spec.to_string()),
            protocol: Some(scheme.to_ascii_lowercase()),
            remote: true,
            remote_user: user,
            remote_host: Some(host.to_string()),
            remote_share: non_empty(share),
        });
    }

    if let Some(unc) = parse_remote_path(spec) {
        let (user, host) = split_user(&unc.remote_host);
        let protocol = typed_protocol.unwrap_or_else(|| "smb".to_string());
        return Some(RemoteInfo {
            uri: Some(build_uri(&protocol, user.as_deref(), host, &unc.remote_share)),
            protocol: Some(protocol),
            remote: true,
            remote_user: user,
            remote_host: Some(host.to_string()),
            remote_share: Some(unc.remote_share),
        });
    }

    let (authority, path) = split_host_path(spec)?;
    let (user, host) = split_user(authority);
    if host.is_empty() || host.contains(['/', '\\']) {
        return None;
    }
    let share = path.trim_start_matches('/');
    let protocol = typed_protocol.unwrap_or_else(|| "nfs".to_string());
    Some(RemoteInfo {
        uri: Some(build_uri(&protocol, user.as_deref(), host, share)),
        protocol: Some(protocol),
        remote: true,
        remote_user: user,
        remote_host: Some(host.to_string()),
        remote_share: non_empty(share),
    })
}

/// `scheme://rest` with an RFC 3986 scheme
fn split_url(spec: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = spec.split_once("://")?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic()
        || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    Some((scheme, rest))
}

/// `host:path` or `[v6addr]:path`
fn split_host_path(spec: &str) -> Option<(&str, &str)> {
    if let Some(bracketed) = spec.strip_prefix('[') {
        let (addr, path) = bracketed.split_once("]:")?;
        if addr.is_empty() || path.is_empty() {
            return None;
        }
        return Some((addr, path));
    }
    let (host, path) = spec.split_once(':')?;
    if host.is_empty() || path.is_empty() {
        return None;
    }
    Some((host, path))
}

fn split_user(authority: &str) -> (Option<String>, &str) {
    match authority.rsplit_once('@') {
        Some((user, host)) if !user.is_empty() => (Some(user.to_string()), host),
        _ => (None, authority),
    }
}

fn build_uri(protocol: &str, user: Option<&str>, host: &str, share: &str) -> String {
    match user {
        Some(user) => format!("{}://{}@{}/{}", protocol, user, host, share),
        None => format!("{}://{}/{}", protocol, host, share),
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(host: &str, share: &str) -> Option<RemotePath> {
        Some(RemotePath {
            remote_host: host.to_string(),
            remote_share: share.to_string(),
        })
    }

    #[test]
    fn test_unc_backslash_and_slash_forms() {
        assert_eq!(parse_remote_path("\\\\server\\share"), remote("server", "share"));
        assert_eq!(parse_remote_path("//server/share"), remote("server", "share"));
    }

    #[test]
    fn test_unc_extra_segments_ignored() {
        assert_eq!(
            parse_remote_path("\\\\server\\share\\dir\\file.txt"),
            remote("server", "share")
        );
        // the tail may use either separator
        assert_eq!(
            parse_remote_path("\\\\server\\share\\dir/file.txt"),
            remote("server", "share")
        );
        assert_eq!(
            parse_remote_path("//server/share/dir\\file.txt"),
            remote("server", "share")
        );
    }

    #[test]
    fn test_unc_unicode_names() {
        assert_eq!(parse_remote_path("//сервер/共有"), remote("сервер", "共有"));
    }

    #[test]
    fn test_unc_rejections() {
        assert_eq!(parse_remote_path(""), None);
        assert_eq!(parse_remote_path("\\server\\share"), None);
        assert_eq!(parse_remote_path("/server/share"), None);
        assert_eq!(parse_remote_path("\\\\server/share"), None);
        assert_eq!(parse_remote_path("//server\\share"), None);
        assert_eq!(parse_remote_path("//server/sh\\are/dir"), None);
        assert_eq!(parse_remote_path("\\\\server"), None);
        assert_eq!(parse_remote_path("\\\\\\share"), None);
        assert_eq!(parse_remote_path("//server/"), None);
        assert_eq!(parse_remote_path("//   /share"), None);
        assert_eq!(parse_remote_path("//ser:ver/share"), None);
        assert_eq!(parse_remote_path("//server/sha*re"), None);
    }

    #[test]
    fn test_nfs_spec() {
        let info = parse_remote_spec("nfs-server:/export", Some("nfs")).unwrap();
        assert_eq!(info.protocol.as_deref(), Some("nfs"));
        assert_eq!(info.remote_host.as_deref(), Some("nfs-server"));
        assert_eq!(info.remote_share.as_deref(), Some("export"));
        assert_eq!(info.uri.as_deref(), Some("nfs://nfs-server/export"));
    }

    #[test]
    fn test_sshfs_spec_with_user() {
        let info = parse_remote_spec("alice@box:/home/alice", Some("fuse.sshfs")).unwrap();
        assert_eq!(info.protocol.as_deref(), Some("sshfs"));
        assert_eq!(info.remote_user.as_deref(), Some("alice"));
        assert_eq!(info.remote_host.as_deref(), Some("box"));
        assert_eq!(info.remote_share.as_deref(), Some("home/alice"));
    }

    #[test]
    fn test_cifs_spec() {
        let info = parse_remote_spec("//fileserver/media", Some("cifs")).unwrap();
        assert_eq!(info.protocol.as_deref(), Some("cifs"));
        assert_eq!(info.remote_host.as_deref(), Some("fileserver"));
        assert_eq!(info.remote_share.as_deref(), Some("media"));
    }

    #[test]
    fn test_url_spec() {
        let info = parse_remote_spec("https://dav.example.com/remote.php/webdav", None).unwrap();
        assert_eq!(info.protocol.as_deref(), Some("https"));
        assert_eq!(info.remote_host.as_deref(), Some("dav.example.com"));
        assert_eq!(info.remote_share.as_deref(), Some("remote.php/webdav"));
    }

    #[test]
    fn test_ipv6_spec() {
        let info = parse_remote_spec("[fd00::1]:/srv", Some("nfs4")).unwrap();
        assert_eq!(info.remote_host.as_deref(), Some("fd00::1"));
        assert_eq!(info.protocol.as_deref(), Some("nfs4"));
    }

    #[test]
    fn test_local_specs_are_not_remote() {
        assert!(parse_remote_spec("/dev/sda1", Some("ext4")).is_none());
        assert!(parse_remote_spec("tmpfs", Some("tmpfs")).is_none());
        assert!(parse_remote_spec("proc", None).is_none());
    }

    #[test]
    fn test_network_fs_types() {
        assert!(is_network_fs("nfs4"));
        assert!(is_network_fs("CIFS"));
        assert!(!is_network_fs("ext4"));
    }
}
