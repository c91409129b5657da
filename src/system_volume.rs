//! System volume classification
//!
//! A mount point is a system volume when its path matches one of
//! `systemPathPatterns` or its filesystem type is listed in `systemFsTypes`.

use crate::config::Config;
use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    // `*` stays within one path segment, `**` crosses segments
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled form of the classification rules of one [`Config`]
#[derive(Debug, Clone)]
pub struct SystemVolumeClassifier {
    patterns: Vec<Pattern>,
    fs_types: Vec<String>,
}

impl SystemVolumeClassifier {
    /// Compile the patterns of `config`
    pub fn new(config: &Config) -> Result<Self> {
        let patterns = config
            .system_path_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>>>()?;
        let fs_types = config
            .system_fs_types
            .iter()
            .map(|t| t.to_ascii_lowercase())
            .collect();
        Ok(Self { patterns, fs_types })
    }

    /// Whether the mount point is OS-internal
    pub fn is_system(&self, mount_point: &str, fstype: Option<&str>) -> bool {
        if let Some(fstype) = fstype {
            let fstype = fstype.to_ascii_lowercase();
            if self.fs_types.iter().any(|t| *t == fstype) {
                return true;
            }
        }
        self.patterns
            .iter()
            .any(|p| p.matches_with(mount_point, MATCH_OPTIONS))
    }
}

/// Compile one glob, reporting the offending pattern on failure
pub fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| {
        Error::Validation(format!("invalid system path pattern '{}': {}", pattern, e))
    })
}

/// Classify a single mount point against `config`
pub fn classify(mount_point: &str, fstype: Option<&str>, config: &Config) -> Result<bool> {
    Ok(SystemVolumeClassifier::new(config)?.is_system(mount_point, fstype))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(patterns: &[&str], fs_types: &[&str]) -> Config {
        Config {
            system_path_patterns: patterns.iter().map(|s| s.to_string()).collect(),
            system_fs_types: fs_types.iter().map(|s| s.to_string()).collect(),
            ..Config::default()
        }
    }

    #[test]
    fn test_pattern_match() {
        let cfg = config(&["/proc", "/proc/**", "/run/user/*/gvfs"], &[]);
        assert!(classify("/proc", None, &cfg).unwrap());
        assert!(classify("/proc/sys/fs/binfmt_misc", None, &cfg).unwrap());
        assert!(classify("/run/user/1000/gvfs", None, &cfg).unwrap());
        assert!(!classify("/run/user/1000/doc/x/gvfs", None, &cfg).unwrap());
        assert!(!classify("/home", None, &cfg).unwrap());
    }

    #[test]
    fn test_fstype_match_is_case_insensitive() {
        let cfg = config(&[], &["tmpfs"]);
        assert!(classify("/anything", Some("TMPFS"), &cfg).unwrap());
        assert!(!classify("/anything", Some("ext4"), &cfg).unwrap());
        assert!(!classify("/anything", None, &cfg).unwrap());
    }

    #[test]
    fn test_empty_rules_exclude_nothing() {
        let cfg = config(&[], &[]);
        for mp in ["/proc", "/sys", "/dev", "/"] {
            assert!(!classify(mp, Some("proc"), &cfg).unwrap());
        }
    }

    #[test]
    fn test_classify_is_pure() {
        let cfg = config(&["/snap/**"], &["squashfs"]);
        let first = classify("/snap/core/123", Some("squashfs"), &cfg).unwrap();
        let second = classify("/snap/core/123", Some("squashfs"), &cfg).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let cfg = config(&["/proc/[", "/sys"], &[]);
        assert!(matches!(
            classify("/sys", None, &cfg),
            Err(Error::Validation(_))
        ));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_default_rules_cover_pseudo_filesystems() {
        let cfg = Config::default();
        for mp in ["/proc", "/sys", "/dev", "/dev/shm", "/sys/fs/cgroup", "/run/lock"] {
            assert!(classify(mp, None, &cfg).unwrap(), "{mp} should be system");
        }
        assert!(!classify("/home", Some("ext4"), &cfg).unwrap());
        assert!(!classify("/", Some("ext4"), &cfg).unwrap());
    }
}
