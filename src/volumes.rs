//! Volume orchestration
//!
//! [`Volumes`] wraps a [`VolumeBackend`] and applies everything that does not
//! depend on the OS: input validation, deadlines, system volume
//! classification and filtering, deduplication, ordering and the bounded
//! fan-out of metadata fetches.
//!
//! # Example
//!
//! ```no_run
//! use volmeta::{Config, Volumes};
//!
//! # async fn demo() -> volmeta::Result<()> {
//! let volumes = Volumes::native();
//! let config = Config::default();
//! for mp in volumes.list_mount_points(&config).await? {
//!     let md = volumes.fetch_metadata(&mp.mount_point, &config).await?;
//!     println!("{} {:.1}%", md.mount_point, md.usage_percent());
//! }
//! # Ok(())
//! # }
//! ```

use crate::concurrent::map_concurrent;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hidden;
use crate::path::{locale_cmp, normalize_mount_point, validate_path};
use crate::system_volume::SystemVolumeClassifier;
use crate::timeout::{race, race_blocking};
use crate::volume::{
    HiddenMetadata, HideMethod, MountPoint, NativeBackend, SetHiddenResult, VolumeBackend,
    VolumeHealth, VolumeMetadata,
};
use log::{debug, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Volume and hidden-attribute operations over one backend
pub struct Volumes<B: VolumeBackend + ?Sized = NativeBackend> {
    backend: Arc<B>,
}

impl<B: VolumeBackend + ?Sized> Clone for Volumes<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl Volumes<NativeBackend> {
    /// Operations against the host OS
    pub fn native() -> Self {
        Self::new(NativeBackend)
    }
}

impl Default for Volumes<NativeBackend> {
    fn default() -> Self {
        Self::native()
    }
}

impl<B: VolumeBackend + 'static> Volumes<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }
}

impl<B: VolumeBackend + ?Sized + 'static> Volumes<B> {
    /// Share an existing backend
    pub fn from_arc(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mounted volumes, classified, filtered, deduplicated and sorted
    ///
    /// System volumes are dropped unless `config.include_system_volumes`.
    pub async fn list_mount_points(&self, config: &Config) -> Result<Vec<MountPoint>> {
        config.validate()?;
        let classifier = SystemVolumeClassifier::new(config)?;

        let backend = Arc::clone(&self.backend);
        let cfg = config.clone();
        let raw = race("listMountPoints", config.timeout_ms, async move {
            backend.mount_points(&cfg).await
        })
        .await?;

        debug!("[volumes] backend reported {} mount points", raw.len());
        Ok(arrange(raw, &classifier, config.include_system_volumes))
    }

    /// Mount points from the backend's alternate source, arranged like
    /// [`Volumes::list_mount_points`]
    pub async fn alternate_mount_points(&self, config: &Config) -> Result<Vec<MountPoint>> {
        config.validate()?;
        let classifier = SystemVolumeClassifier::new(config)?;

        let backend = Arc::clone(&self.backend);
        let cfg = config.clone();
        let raw = race("alternateMountPoints", config.timeout_ms, async move {
            backend.alternate_mount_points(&cfg).await
        })
        .await?;

        Ok(arrange(raw, &classifier, config.include_system_volumes))
    }

    /// Metadata for one mount point, bounded by `config.timeout_ms`
    pub async fn fetch_metadata(&self, mount_point: &str, config: &Config) -> Result<VolumeMetadata> {
        config.validate()?;
        let classifier = SystemVolumeClassifier::new(config)?;
        fetch_one(Arc::clone(&self.backend), mount_point, config.clone(), &classifier).await
    }

    /// Metadata for every listed volume
    ///
    /// Fetches run at most `config.max_concurrency` at a time. A volume whose
    /// fetch fails still gets a record, carrying the failure in `status` and
    /// `error`, so the output lines up with [`Volumes::list_mount_points`].
    pub async fn all_volume_metadata(&self, config: &Config) -> Result<Vec<VolumeMetadata>> {
        let mounts = self.list_mount_points(config).await?;
        let classifier = Arc::new(SystemVolumeClassifier::new(config)?);
        let backend = Arc::clone(&self.backend);
        let cfg = config.clone();

        let results = map_concurrent(mounts.clone(), config.max_concurrency, move |mp| {
            let backend = Arc::clone(&backend);
            let cfg = cfg.clone();
            let classifier = Arc::clone(&classifier);
            async move { fetch_one(backend, &mp.mount_point, cfg, &classifier).await }
        })
        .await?;

        Ok(mounts
            .into_iter()
            .zip(results)
            .map(|(mp, result)| match result {
                Ok(md) => md,
                Err(e) => {
                    warn!("[volumes] metadata for {} failed: {}", mp.mount_point, e);
                    failed_slot(mp, &e)
                }
            })
            .collect())
    }

    /// Whether `path` is hidden by any mechanism this OS supports
    pub async fn is_hidden(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = owned_path(path.as_ref())?;
        let backend = Arc::clone(&self.backend);
        race_blocking("isHidden", 0, move || hidden::is_hidden(&*backend, &path)).await
    }

    /// Whether `path` or any of its ancestors is hidden
    pub async fn is_hidden_recursive(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = owned_path(path.as_ref())?;
        let backend = Arc::clone(&self.backend);
        race_blocking("isHiddenRecursive", 0, move || {
            hidden::is_hidden_recursive(&*backend, &path)
        })
        .await
    }

    /// Per-mechanism hidden state of `path`
    pub async fn get_hidden_metadata(&self, path: impl AsRef<Path>) -> Result<HiddenMetadata> {
        let path = owned_path(path.as_ref())?;
        let backend = Arc::clone(&self.backend);
        race_blocking("getHiddenMetadata", 0, move || {
            hidden::get_hidden_metadata(&*backend, &path)
        })
        .await
    }

    /// Hide or reveal `path`; see [`hidden::set_hidden`]
    pub async fn set_hidden(
        &self,
        path: impl AsRef<Path>,
        hide: bool,
        method: HideMethod,
    ) -> Result<SetHiddenResult> {
        let path = owned_path(path.as_ref())?;
        let backend = Arc::clone(&self.backend);
        race_blocking("setHidden", 0, move || {
            hidden::set_hidden(&*backend, &path, hide, method)
        })
        .await
    }
}

fn owned_path(path: &Path) -> Result<PathBuf> {
    validate_path(path)?;
    Ok(path.to_path_buf())
}

async fn fetch_one<B: VolumeBackend + ?Sized + 'static>(
    backend: Arc<B>,
    mount_point: &str,
    config: Config,
    classifier: &SystemVolumeClassifier,
) -> Result<VolumeMetadata> {
    validate_path(Path::new(mount_point))?;
    let normalized = normalize_mount_point(mount_point);

    let key = normalized.clone();
    let timeout_ms = config.timeout_ms;
    let mut md = race("fetchMetadata", timeout_ms, async move {
        backend.volume_metadata(&key, &config).await
    })
    .await?;

    md.mount_point = normalized;
    md.is_system_volume |= classifier.is_system(&md.mount_point, md.fstype.as_deref());
    Ok(md)
}

/// Record standing in for a volume whose fetch failed
fn failed_slot(mp: MountPoint, err: &Error) -> VolumeMetadata {
    let status = match err {
        Error::Timeout { .. } => VolumeHealth::Timeout,
        Error::NotAccessible { .. } => VolumeHealth::Inaccessible,
        _ => mp.status.unwrap_or(VolumeHealth::Error),
    };
    let mut md = VolumeMetadata::new(mp.mount_point);
    md.fstype = mp.fstype;
    md.is_system_volume = mp.is_system_volume;
    md.status = Some(status);
    md.error = Some(err.to_string());
    md
}

/// Normalize, classify, filter, deduplicate (first wins) and sort
fn arrange(
    raw: Vec<MountPoint>,
    classifier: &SystemVolumeClassifier,
    include_system_volumes: bool,
) -> Vec<MountPoint> {
    let mut seen = HashSet::new();
    let mut mounts: Vec<MountPoint> = raw
        .into_iter()
        .filter_map(|mut mp| {
            mp.mount_point = normalize_mount_point(&mp.mount_point);
            if mp.mount_point.is_empty() {
                return None;
            }
            mp.is_system_volume |= classifier.is_system(&mp.mount_point, mp.fstype.as_deref());
            if mp.is_system_volume && !include_system_volumes {
                return None;
            }
            seen.insert(mp.mount_point.clone()).then_some(mp)
        })
        .collect();

    mounts.sort_by(|a, b| locale_cmp(&a.mount_point, &b.mount_point));
    mounts
}

/// [`Volumes::list_mount_points`] on the host OS
pub async fn list_mount_points(config: &Config) -> Result<Vec<MountPoint>> {
    Volumes::native().list_mount_points(config).await
}

/// [`Volumes::fetch_metadata`] on the host OS
pub async fn fetch_metadata(mount_point: &str, config: &Config) -> Result<VolumeMetadata> {
    Volumes::native().fetch_metadata(mount_point, config).await
}

/// [`Volumes::all_volume_metadata`] on the host OS
pub async fn all_volume_metadata(config: &Config) -> Result<Vec<VolumeMetadata>> {
    Volumes::native().all_volume_metadata(config).await
}

/// [`Volumes::is_hidden`] on the host OS
pub async fn is_hidden(path: impl AsRef<Path>) -> Result<bool> {
    Volumes::native().is_hidden(path).await
}

/// [`Volumes::is_hidden_recursive`] on the host OS
pub async fn is_hidden_recursive(path: impl AsRef<Path>) -> Result<bool> {
    Volumes::native().is_hidden_recursive(path).await
}

/// [`Volumes::get_hidden_metadata`] on the host OS
pub async fn get_hidden_metadata(path: impl AsRef<Path>) -> Result<HiddenMetadata> {
    Volumes::native().get_hidden_metadata(path).await
}

/// [`Volumes::set_hidden`] on the host OS
pub async fn set_hidden(
    path: impl AsRef<Path>,
    hide: bool,
    method: HideMethod,
) -> Result<SetHiddenResult> {
    Volumes::native().set_hidden(path, hide, method).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::mock::MockBackend;
    use crate::volume::HiddenSupport;
    use std::time::Duration;

    fn config() -> Config {
        Config {
            system_path_patterns: vec!["/proc".to_string(), "/proc/**".to_string()],
            system_fs_types: vec!["sysfs".to_string()],
            include_system_volumes: false,
            ..Config::default()
        }
    }

    fn names(mounts: &[MountPoint]) -> Vec<&str> {
        mounts.iter().map(|m| m.mount_point.as_str()).collect()
    }

    #[tokio::test]
    async fn test_list_sorted_and_deduplicated() {
        let backend = MockBackend::with_mounts(&[
            ("/mnt/zeta", Some("ext4")),
            ("/home", Some("ext4")),
            ("/Media", Some("xfs")),
            ("/home", Some("btrfs")),
            ("/", Some("ext4")),
        ]);
        let mounts = Volumes::new(backend).list_mount_points(&config()).await.unwrap();

        assert_eq!(names(&mounts), vec!["/", "/home", "/Media", "/mnt/zeta"]);
        // first occurrence wins
        assert_eq!(mounts[1].fstype.as_deref(), Some("ext4"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_normalizes_before_dedup() {
        let backend = MockBackend::with_mounts(&[("/data/", None), ("/data", None)]);
        let mounts = Volumes::new(backend).list_mount_points(&config()).await.unwrap();
        assert_eq!(names(&mounts), vec!["/data"]);
    }

    #[tokio::test]
    async fn test_system_volumes_filtered() {
        let backend = MockBackend::with_mounts(&[
            ("/proc", Some("proc")),
            ("/proc/sys/fs/binfmt_misc", Some("binfmt_misc")),
            ("/sys", Some("sysfs")),
            ("/home", Some("ext4")),
        ]);
        let volumes = Volumes::new(backend);

        let mounts = volumes.list_mount_points(&config()).await.unwrap();
        assert_eq!(names(&mounts), vec!["/home"]);

        let all = volumes
            .list_mount_points(&config().with_system_volumes(true))
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().filter(|m| m.mount_point != "/home").all(|m| m.is_system_volume));
    }

    #[tokio::test]
    async fn test_empty_rules_exclude_nothing() {
        let backend = MockBackend::with_mounts(&[("/proc", Some("proc")), ("/home", None)]);
        let cfg = Config {
            system_path_patterns: Vec::new(),
            system_fs_types: Vec::new(),
            include_system_volumes: false,
            ..Config::default()
        };
        let mounts = Volumes::new(backend).list_mount_points(&cfg).await.unwrap();
        assert_eq!(mounts.len(), 2);
    }

    #[tokio::test]
    async fn test_backend_system_hint_is_kept() {
        let mut backend = MockBackend::with_mounts(&[("/boot/firmware", None), ("/home", None)]);
        backend.mounts[0].is_system_volume = true;
        let mounts = Volumes::new(backend).list_mount_points(&config()).await.unwrap();
        assert_eq!(names(&mounts), vec!["/home"]);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let volumes = Volumes::new(MockBackend::with_mounts(&[("/", None)]));
        let cfg = config().with_max_concurrency(0);
        assert!(matches!(
            volumes.list_mount_points(&cfg).await,
            Err(Error::Validation(_))
        ));

        let cfg = Config {
            system_path_patterns: vec!["/[".to_string()],
            ..config()
        };
        assert!(matches!(
            volumes.fetch_metadata("/", &cfg).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_metadata_classifies() {
        let volumes = Volumes::new(MockBackend::with_mounts(&[
            ("/proc", Some("proc")),
            ("/home", Some("ext4")),
        ]));
        let md = volumes.fetch_metadata("/proc", &config()).await.unwrap();
        assert!(md.is_system_volume);
        let md = volumes.fetch_metadata("/home", &config()).await.unwrap();
        assert!(!md.is_system_volume);
        assert_eq!(md.size, 1 << 30);
    }

    #[tokio::test]
    async fn test_fetch_metadata_empty_path() {
        let volumes = Volumes::new(MockBackend::with_mounts(&[]));
        assert!(matches!(
            volumes.fetch_metadata("", &config()).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_metadata_times_out() {
        let mut backend = MockBackend::with_mounts(&[("/slow", None)]);
        backend.delay = Some(Duration::from_secs(60));
        let volumes = Volumes::new(backend);

        let err = volumes
            .fetch_metadata("/slow", &config().with_timeout_ms(50))
            .await
            .unwrap_err();
        match err {
            Error::Timeout {
                operation,
                timeout_ms,
            } => {
                assert_eq!(operation, "fetchMetadata");
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_times_out() {
        let mut backend = MockBackend::with_mounts(&[("/", None)]);
        backend.delay = Some(Duration::from_secs(60));
        let err = Volumes::new(backend)
            .list_mount_points(&config().with_timeout_ms(1))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_all_volume_metadata_fills_failed_slots() {
        let mut backend = MockBackend::with_mounts(&[("/a", None), ("/b", None), ("/c", None)]);
        backend.metadata.remove("/b");
        let all = Volumes::new(backend)
            .all_volume_metadata(&config().with_max_concurrency(2))
            .await
            .unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(all[0].mount_point, "/a");
        assert_eq!(all[0].size, 1 << 30);
        assert_eq!(all[1].mount_point, "/b");
        assert_eq!(all[1].status, Some(VolumeHealth::Inaccessible));
        assert!(all[1].error.is_some());
        assert_eq!(all[2].mount_point, "/c");
    }

    #[tokio::test]
    async fn test_alternate_unsupported_on_mock() {
        let volumes = Volumes::new(MockBackend::with_mounts(&[]));
        assert!(matches!(
            volumes.alternate_mount_points(&config()).await,
            Err(Error::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_hidden_round_trip() {
        let dir = tempfile::Builder::new().prefix("volmeta-").tempdir().unwrap();
        let notes = dir.path().join("notes");
        std::fs::create_dir(&notes).unwrap();

        let volumes = Volumes::new(MockBackend::with_support(HiddenSupport {
            dot_prefix: true,
            system_flag: false,
        }));
        assert!(!volumes.is_hidden(&notes).await.unwrap());

        let result = volumes.set_hidden(&notes, true, HideMethod::Auto).await.unwrap();
        assert_eq!(result.pathname, dir.path().join(".notes"));
        assert!(result.actions.dot_prefix);
        assert!(volumes.is_hidden(&result.pathname).await.unwrap());

        let child = result.pathname.join("inner");
        assert!(volumes.is_hidden_recursive(&child).await.unwrap());

        let md = volumes.get_hidden_metadata(&result.pathname).await.unwrap();
        assert!(md.hidden && md.dot_prefix && !md.system_flag);
    }

    #[tokio::test]
    async fn test_hidden_rejects_empty_path() {
        let volumes = Volumes::new(MockBackend::with_mounts(&[]));
        assert!(matches!(
            volumes.is_hidden("").await,
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_failed_slot_status() {
        let mp = MountPoint::new("/mnt/x", Some("nfs".to_string()));
        let md = failed_slot(
            mp,
            &Error::Timeout {
                operation: "fetchMetadata".to_string(),
                timeout_ms: 5,
            },
        );
        assert_eq!(md.status, Some(VolumeHealth::Timeout));
        assert_eq!(md.fstype.as_deref(), Some("nfs"));
        assert_eq!(md.size, 0);
    }
}
