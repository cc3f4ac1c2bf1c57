//! cephfs-mount-core: volume attachment for CephFS.
//!
//! This library decides which CephFS client to use on a host, drives it
//! through the external mount tooling, keeps track of the `ceph-fuse`
//! daemons it starts, and tears mounts down idempotently.
//!
//! # Modules
//!
//! - [`kernel`]: Kernel release parsing and quota support matching
//! - [`registry`]: Probing for usable clients and picking a driver
//! - [`mounter`]: Kernel and FUSE mount drivers
//! - [`mount`]: Mount points, bind mounts and unmounting
//! - [`tracker`]: FUSE daemon PIDs by mount point
//! - [`executor`]: External command execution
//! - [`config`]: Mounter configuration
//! - [`protocol`]: Daemon request/response types
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use cephfs_mount_core::{Credentials, MounterConfig, MounterRegistry, VolumeOptions};
//!
//! let config = MounterConfig::default();
//! let ctx = config.execution_context();
//!
//! // Probe once at startup
//! let registry = MounterRegistry::load(&ctx, config).unwrap();
//!
//! let cr = Credentials {
//!     id: "admin".to_string(),
//!     key_file: PathBuf::from("/etc/ceph/admin.secret"),
//! };
//! let opts = VolumeOptions {
//!     monitors: "10.0.0.1:6789".to_string(),
//!     root_path: "/volumes/csi/vol-1".to_string(),
//!     ..VolumeOptions::default()
//! };
//!
//! let mount_point = Path::new("/var/lib/kubelet/staging/vol-1");
//! registry.mount(&ctx, mount_point, &cr, &opts).unwrap();
//! registry.unmount(&ctx, mount_point).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod kernel;
pub mod mount;
pub mod mounter;
pub mod protocol;
pub mod registry;
pub mod tracker;
pub mod volume;

// Re-export commonly used types
pub use config::MounterConfig;
pub use error::{Error, Result};
pub use executor::ExecutionContext;
pub use mount::{UnmountOutcome, bind_mount};
pub use mounter::{MounterKind, VolumeMounter};
pub use registry::{MounterRegistry, ProbeReport, ProbeStatus};
pub use volume::{Credentials, VolumeOptions};
