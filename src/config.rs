//! Configuration for volume enumeration
//!
//! Every field is optional on the wire and falls back to a per-OS default.
//! A `Config` is passed into each call; the library keeps no global settings.

use crate::error::{Error, Result};
use crate::system_volume;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-call configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Deadline for each raced native operation, 0 disables it
    pub timeout_ms: u64,
    /// Upper bound on metadata fetches in flight at once
    pub max_concurrency: usize,
    /// Globs matched against mount points to flag system volumes
    pub system_path_patterns: Vec<String>,
    /// Filesystem types that mark a system volume
    pub system_fs_types: Vec<String>,
    /// Mount tables to try in order; the first readable one wins
    pub linux_mount_table_paths: Vec<String>,
    /// Keep system volumes in `list_mount_points` output
    pub include_system_volumes: bool,
}

// Default value functions
fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_concurrency() -> usize {
    num_cpus::get().max(1)
}

#[cfg(not(windows))]
fn default_system_path_patterns() -> Vec<String> {
    [
        "/boot",
        "/boot/efi",
        "/dev",
        "/dev/**",
        "/proc",
        "/proc/**",
        "/sys",
        "/sys/**",
        "/run",
        "/run/credentials/**",
        "/run/lock",
        "/run/snapd/**",
        "/run/user/*/doc",
        "/run/user/*/gvfs",
        "/run/docker/**",
        "/snap/**",
        "/tmp",
        "/var/tmp",
        "/var/lib/docker/**",
        "/var/lib/containers/storage/**",
        "/var/lib/kubelet/**",
        "**/#snapshot",
        // macOS
        "/System/Volumes/*",
        "/System/Volumes/Update/**",
        "/private/var/vm",
        "/Library/Developer/CoreSimulator/Volumes/**",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(windows)]
fn default_system_path_patterns() -> Vec<String> {
    Vec::new()
}

#[cfg(not(windows))]
fn default_system_fs_types() -> Vec<String> {
    [
        "autofs",
        "binfmt_misc",
        "bpf",
        "cgroup",
        "cgroup2",
        "configfs",
        "debugfs",
        "devfs",
        "devpts",
        "devtmpfs",
        "efivarfs",
        "fusectl",
        "hugetlbfs",
        "mqueue",
        "nsfs",
        "overlay",
        "proc",
        "pstore",
        "ramfs",
        "rpc_pipefs",
        "securityfs",
        "selinuxfs",
        "squashfs",
        "sysfs",
        "tmpfs",
        "tracefs",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(windows)]
fn default_system_fs_types() -> Vec<String> {
    Vec::new()
}

fn default_linux_mount_table_paths() -> Vec<String> {
    vec![
        "/proc/mounts".to_string(),
        "/proc/self/mounts".to_string(),
        "/etc/mtab".to_string(),
    ]
}

fn default_include_system_volumes() -> bool {
    // A Windows system drive is usually also the main data drive.
    cfg!(windows)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            system_path_patterns: default_system_path_patterns(),
            system_fs_types: default_system_fs_types(),
            linux_mount_table_paths: default_linux_mount_table_paths(),
            include_system_volumes: default_include_system_volumes(),
        }
    }
}

impl Config {
    /// Set the per-operation deadline
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the fan-out bound
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Keep or drop system volumes in listings
    pub fn with_system_volumes(mut self, include: bool) -> Self {
        self.include_system_volumes = include;
        self
    }

    /// Check value ranges and compile every glob
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::Validation(
                "maxConcurrency must be at least 1".to_string(),
            ));
        }
        if self.linux_mount_table_paths.is_empty() {
            return Err(Error::Validation(
                "linuxMountTablePaths must not be empty".to_string(),
            ));
        }
        if let Some(blank) = self
            .linux_mount_table_paths
            .iter()
            .find(|p| p.trim().is_empty())
        {
            return Err(Error::Validation(format!(
                "linuxMountTablePaths contains a blank entry: '{}'",
                blank
            )));
        }
        for pattern in &self.system_path_patterns {
            system_volume::compile(pattern)?;
        }
        Ok(())
    }

    /// Parse and validate TOML
    ///
    /// Wrong types, including negative numbers, are validation errors.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| Error::Validation(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file location
    ///
    /// `~/.config/volmeta/config.toml` on Unix-like systems,
    /// `%APPDATA%\volmeta\config.toml` on Windows.
    pub fn default_path() -> PathBuf {
        let config_dir = if cfg!(windows) {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from(".config"))
        };

        config_dir.join("volmeta").join("config.toml")
    }

    /// Load from the default path, or defaults when no file exists
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Validation(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }
}
