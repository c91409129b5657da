//! CLI tool for volmeta

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "volmeta")]
#[command(about = "Volume metadata: mount points, capacity, labels, remote shares and hidden files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML); defaults to the per-user config if present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Deadline for each native operation in milliseconds, 0 disables it
    #[arg(short, long, global = true)]
    timeout_ms: Option<u64>,

    /// Upper bound on concurrent metadata fetches
    #[arg(short = 'j', long, global = true)]
    max_concurrency: Option<usize>,

    /// Keep system volumes in listings
    #[arg(long, global = true)]
    include_system: bool,

    /// Output format (json or text)
    #[arg(short, long, default_value = "text", global = true)]
    format: String,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// List mount points (default)
    List {
        /// Use the alternate mount source (Linux: /proc/self/mountinfo)
        #[arg(long)]
        alternate: bool,
    },
    /// Show metadata for one mount point
    Meta {
        /// Mount point, such as / or C:\
        mount_point: String,
    },
    /// Show metadata for every mount point
    All,
    /// Inspect or change hidden attributes
    Hidden {
        #[command(subcommand)]
        action: HiddenAction,
    },
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum HiddenAction {
    /// Whether the path is hidden
    Get { path: PathBuf },
    /// Whether the path or any ancestor is hidden
    Recursive { path: PathBuf },
    /// Per-mechanism hidden state
    Meta { path: PathBuf },
    /// Hide or reveal a path
    Set {
        path: PathBuf,
        /// Reveal instead of hide
        #[arg(long)]
        unhide: bool,
        /// dotPrefix, systemFlag, all or auto
        #[arg(short, long, default_value = "auto")]
        method: String,
    },
}

#[cfg(feature = "cli")]
fn load_config(cli: &Cli) -> volmeta::Result<volmeta::Config> {
    let mut config = match &cli.config {
        Some(path) => volmeta::Config::load_from(path)?,
        None => volmeta::Config::load()?,
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_timeout_ms(timeout_ms);
    }
    if let Some(max) = cli.max_concurrency {
        config = config.with_max_concurrency(max);
    }
    if cli.include_system {
        config = config.with_system_volumes(true);
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use volmeta::{HideMethod, Volumes};

    let cli = Cli::parse();

    env_logger::init();

    let config = load_config(&cli)?;
    let volumes = Volumes::native();
    let json = cli.format == "json";

    match &cli.command {
        None | Some(Commands::List { alternate: false }) => {
            let mounts = volumes.list_mount_points(&config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&mounts)?);
            } else {
                print_mount_points(&mounts);
            }
        }
        Some(Commands::List { alternate: true }) => {
            let mounts = volumes.alternate_mount_points(&config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&mounts)?);
            } else {
                print_mount_points(&mounts);
            }
        }
        Some(Commands::Meta { mount_point }) => {
            let md = volumes.fetch_metadata(mount_point, &config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&md)?);
            } else {
                print_metadata(&md);
            }
        }
        Some(Commands::All) => {
            let all = volumes.all_volume_metadata(&config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else {
                print_volume_table(&all);
            }
        }
        Some(Commands::Hidden { action }) => match action {
            HiddenAction::Get { path } => {
                let hidden = volumes.is_hidden(path).await?;
                println!("{}", hidden);
            }
            HiddenAction::Recursive { path } => {
                let hidden = volumes.is_hidden_recursive(path).await?;
                println!("{}", hidden);
            }
            HiddenAction::Meta { path } => {
                let md = volumes.get_hidden_metadata(path).await?;
                println!("{}", serde_json::to_string_pretty(&md)?);
            }
            HiddenAction::Set {
                path,
                unhide,
                method,
            } => {
                let method: HideMethod = method.parse()?;
                let result = volumes.set_hidden(path, !unhide, method).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    println!("{}", result.pathname.display());
                }
            }
        },
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(feature = "cli")]
fn print_mount_points(mounts: &[volmeta::MountPoint]) {
    println!("{:<40} {:<12} {:<12} {}", "MOUNT POINT", "TYPE", "STATUS", "SYSTEM");
    for mp in mounts {
        println!(
            "{:<40} {:<12} {:<12} {}",
            mp.mount_point,
            mp.fstype.as_deref().unwrap_or("-"),
            mp.status.map(|s| s.as_str()).unwrap_or("-"),
            if mp.is_system_volume { "yes" } else { "" }
        );
    }
}

#[cfg(feature = "cli")]
fn print_metadata(md: &volmeta::VolumeMetadata) {
    println!("Mount point:  {}", md.mount_point);
    println!("Type:         {}", md.fstype.as_deref().unwrap_or("-"));
    println!("Label:        {}", md.label.as_deref().unwrap_or("-"));
    println!("UUID:         {}", md.uuid.as_deref().unwrap_or("-"));
    println!("Mounted from: {}", md.mount_from.as_deref().unwrap_or("-"));
    println!(
        "Size:         {} ({} used, {} available, {:.1}%)",
        format_bytes(md.size),
        format_bytes(md.used),
        format_bytes(md.available),
        md.usage_percent()
    );
    if md.remote {
        println!(
            "Remote:       {}://{}{}/{}",
            md.protocol.as_deref().unwrap_or("?"),
            md.remote_user
                .as_deref()
                .map(|u| format!("{}@", u))
                .unwrap_or_default(),
            md.remote_host.as_deref().unwrap_or("?"),
            md.remote_share.as_deref().unwrap_or("")
        );
    }
    if let Some(status) = md.status {
        println!("Status:       {}", status);
    }
    if let Some(error) = &md.error {
        println!("Note:         {}", error);
    }
}

#[cfg(feature = "cli")]
fn print_volume_table(all: &[volmeta::VolumeMetadata]) {
    println!(
        "{:<32} {:<10} {:>10} {:>10} {:>6}  {}",
        "MOUNT POINT", "TYPE", "SIZE", "AVAIL", "USE%", "LABEL"
    );
    for md in all {
        if let Some(error) = md.error.as_deref().filter(|_| md.size == 0) {
            println!("{:<32} {}", md.mount_point, error);
            continue;
        }
        println!(
            "{:<32} {:<10} {:>10} {:>10} {:>5.1}%  {}",
            md.mount_point,
            md.fstype.as_deref().unwrap_or("-"),
            format_bytes(md.size),
            format_bytes(md.available),
            md.usage_percent(),
            md.label.as_deref().unwrap_or("")
        );
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
