//! CephFS Mount CLI - Command line interface for CephFS volume mounting.
//!
//! One-shot commands probe, mount, bind and unmount directly. The daemon mode
//! keeps one registry alive so `ceph-fuse` daemons started by a mount can be
//! reaped by the matching unmount.

mod daemon;

use std::path::PathBuf;
use std::process;

use cephfs_mount_core::mount::unmount_volume;
use cephfs_mount_core::tracker::ProcessTracker;
use cephfs_mount_core::{
    Credentials, MounterConfig, MounterKind, MounterRegistry, VolumeOptions, bind_mount,
};
use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// CephFS Mount CLI tool.
#[derive(Parser)]
#[command(name = "cephfs-mount-cli")]
#[command(about = "CLI for CephFS volume mounting", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, env = "CEPHFS_MOUNT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Load the kernel client regardless of the running kernel version.
    #[arg(long, env = "CEPHFS_FORCE_KERNEL_CLIENT", global = true)]
    force_kernel_client: bool,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the host for usable CephFS clients.
    Probe,

    /// Mount a CephFS volume.
    Mount {
        /// Local directory to mount onto (created if missing).
        mount_point: PathBuf,
        /// Comma-separated monitor addresses.
        #[arg(long)]
        monitors: String,
        /// Path inside CephFS to mount.
        #[arg(long, default_value = "/")]
        root_path: String,
        /// CephFS filesystem name.
        #[arg(long)]
        fs_name: Option<String>,
        /// Preferred client: kernel or fuse.
        #[arg(long)]
        mounter: Option<MounterKind>,
        /// Ceph entity ID, without the `client.` prefix.
        #[arg(long)]
        id: String,
        /// File holding the secret key.
        #[arg(long)]
        key_file: PathBuf,
        /// Extra options for the kernel client.
        #[arg(long)]
        kernel_options: Option<String>,
        /// Extra options for ceph-fuse.
        #[arg(long)]
        fuse_options: Option<String>,
    },

    /// Bind-mount an existing path, optionally read-only.
    Bind {
        from: PathBuf,
        to: PathBuf,
        #[arg(long)]
        read_only: bool,
        /// Mount options, e.g. `-o bind,_netdev`.
        #[arg(short = 'o', long, value_delimiter = ',', default_value = "bind")]
        options: Vec<String>,
    },

    /// Unmount a path. Succeeds if nothing is mounted there.
    Unmount { mount_point: PathBuf },

    /// Run as a daemon, accepting JSON commands via stdin.
    ///
    /// The daemon probes once at startup and serves mount and unmount
    /// requests until stdin closes or a shutdown command arrives.
    Daemon,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_config(cli: &Cli) -> CliResult<MounterConfig> {
    let mut config = match &cli.config {
        Some(path) => MounterConfig::from_file(path)?,
        None => MounterConfig::default(),
    };
    if cli.force_kernel_client {
        config.force_kernel_client = true;
    }
    Ok(config)
}

fn run(cli: Cli) -> CliResult<()> {
    let config = load_config(&cli)?;
    let ctx = config.execution_context();

    match cli.command {
        Commands::Probe => {
            let registry = MounterRegistry::load(&ctx, config)?;
            for report in registry.probe_reports() {
                println!("{}", serde_json::to_string(report)?);
            }
        }
        Commands::Mount {
            mount_point,
            monitors,
            root_path,
            fs_name,
            mounter,
            id,
            key_file,
            kernel_options,
            fuse_options,
        } => {
            let registry = MounterRegistry::load(&ctx, config)?;
            let cr = Credentials { id, key_file };
            let opts = VolumeOptions {
                monitors,
                root_path,
                fs_name,
                mounter,
                kernel_mount_options: kernel_options,
                fuse_mount_options: fuse_options,
            };
            let used = registry.mount(&ctx, &mount_point, &cr, &opts)?;
            println!("{}", used);
        }
        Commands::Bind {
            from,
            to,
            read_only,
            options,
        } => {
            bind_mount(&ctx, &from, &to, read_only, &options)?;
        }
        Commands::Unmount { mount_point } => {
            // A one-shot process never started a daemon it could reap.
            let outcome = unmount_volume(&ctx, &mount_point, &ProcessTracker::new())?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Daemon => {
            let registry = MounterRegistry::load(&ctx, config)?;
            daemon::run_daemon(&registry, &ctx)?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
