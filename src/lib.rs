//! # volmeta
//!
//! Cross-platform volume enumeration, volume metadata and hidden-file
//! attributes for Linux, macOS and Windows. Every native call that can hang
//! (a dead network share, a wedged disk) is bounded by a deadline, and batch
//! work runs with bounded concurrency.
//!
//! ## Features
//!
//! - **Mount points**: enumerated per OS, with system volumes classified by
//!   glob and filesystem type, deduplicated and sorted
//! - **Metadata**: capacity, usage, filesystem type, label, UUID and remote
//!   share identity; enrichment failures degrade a result instead of failing it
//! - **Hidden files**: dot prefix and the OS hidden flag (`UF_HIDDEN`,
//!   `FILE_ATTRIBUTE_HIDDEN`) behind one API
//! - **Mount tables**: a parser and formatter for the `/etc/fstab` text format
//!   including its octal escapes
//!
//! ## Quick Start
//!
//! ```no_run
//! use volmeta::{Config, Volumes};
//!
//! # #[tokio::main]
//! # async fn main() -> volmeta::Result<()> {
//! let volumes = Volumes::native();
//! let config = Config::default().with_timeout_ms(2000);
//!
//! for md in volumes.all_volume_metadata(&config).await? {
//!     println!(
//!         "{:<24} {:>6} {:>5.1}% {}",
//!         md.mount_point,
//!         md.fstype.as_deref().unwrap_or("-"),
//!         md.usage_percent(),
//!         md.status.map(|s| s.as_str()).unwrap_or("")
//!     );
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Hidden files
//!
//! ```no_run
//! use volmeta::HideMethod;
//!
//! # #[tokio::main]
//! # async fn main() -> volmeta::Result<()> {
//! let result = volmeta::set_hidden("notes.txt", true, HideMethod::Auto).await?;
//! println!("now at {}", result.pathname.display());
//! assert!(volmeta::is_hidden(&result.pathname).await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` - the `volmeta` command-line tool
//!
//! ## Platform Support
//!
//! | Platform | Mount points | Metadata | Label/UUID | Remote shares | Dot prefix | Hidden flag |
//! |----------|--------------|----------|------------|---------------|------------|-------------|
//! | Linux    | ✅           | ✅       | ✅         | ✅            | ✅         | ❌          |
//! | Windows  | ✅           | ✅       | ✅         | ✅            | ❌         | ✅          |
//! | macOS    | ✅           | ✅       | ✅         | ✅            | ✅         | ✅          |

pub mod concurrent; // Bounded-concurrency map
pub mod config; // Configuration with TOML persistence
pub mod error;
pub mod guard; // Scoped release of foreign handles
pub mod hidden; // Hidden-file attribute engine
pub mod mtab; // Mount table parser and formatter
pub mod path;
pub mod remote; // Remote share identity
pub mod system_volume;
pub mod timeout; // Deadline racing and watchdog threads
pub mod volume; // Per-OS backends
pub mod volumes; // Orchestration

pub use config::Config;
pub use error::{Error, Result};
pub use mtab::MtabEntry;
pub use remote::{parse_remote_path, RemotePath};
pub use system_volume::SystemVolumeClassifier;
pub use volume::{
    HiddenActions, HiddenMetadata, HiddenSupport, HideMethod, MountPoint, NativeBackend,
    RemoteInfo, SetHiddenResult, VolumeBackend, VolumeHealth, VolumeMetadata,
};
pub use volumes::{
    all_volume_metadata, fetch_metadata, get_hidden_metadata, is_hidden, is_hidden_recursive,
    list_mount_points, set_hidden, Volumes,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
