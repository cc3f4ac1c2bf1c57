//! Mount point preparation, bind mounts and unmounting.

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{BindMountSnafu, Error, IoResultExt, ReadOnlyRemountSnafu, Result};
use crate::executor::ExecutionContext;
use crate::tracker::{ProcessTracker, reap};

/// Permissions for freshly created mount points.
const MOUNT_POINT_MODE: u32 = 0o750;

/// Creates a mount point directory (and parents) if it doesn't exist.
pub fn create_mount_point(path: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(MOUNT_POINT_MODE)
        .create(path)
        .mount_point_context(path)
}

/// Appends mount options to a comma-separated option string.
///
/// Empty entries are dropped and an option already present is not added twice.
/// Each entry of `add` may itself be a comma-separated list.
pub fn mount_options_add(options: &str, add: &[&str]) -> String {
    let mut merged: Vec<&str> = Vec::new();

    let incoming = std::iter::once(options)
        .chain(add.iter().copied())
        .flat_map(|list| list.split(','))
        .map(str::trim)
        .filter(|opt| !opt.is_empty());

    for opt in incoming {
        if !merged.contains(&opt) {
            merged.push(opt);
        }
    }

    merged.join(",")
}

/// Bind-mounts `from` onto `to` with the given options.
///
/// A bind mount cannot be made read-only while it is being created, so
/// `read_only` issues a second `remount` of `to`. If that second step fails
/// the writable bind mount stays in place.
pub fn bind_mount(
    ctx: &ExecutionContext,
    from: &Path,
    to: &Path,
    read_only: bool,
    options: &[String],
) -> Result<()> {
    let joined = options.join(",");

    ctx.run_checked(
        "mount",
        &[
            "-o".to_string(),
            joined.clone(),
            from.display().to_string(),
            to.display().to_string(),
        ],
    )
    .context(BindMountSnafu { src: from, dst: to })?;

    if read_only {
        let remount = mount_options_add(&joined, &["remount"]);
        let args = ["-o".to_string(), remount, to.display().to_string()];
        ctx.run_checked("mount", &args)
            .context(ReadOnlyRemountSnafu { path: to })?;
    }

    debug!("bind-mounted {} to {}", from.display(), to.display());
    Ok(())
}

/// How an unmount request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmountOutcome {
    /// The mount point was mounted and has been detached.
    Unmounted,
    /// Nothing was mounted there; treated as success.
    NotMounted,
}

/// Unmounts `mount_point` and reaps its FUSE daemon, if one was tracked.
///
/// Unmounting something that is not mounted (or does not exist) succeeds with
/// [`UnmountOutcome::NotMounted`]. Either way a tracked daemon for the path is
/// removed from `tracker` and reaped.
pub fn unmount_volume(
    ctx: &ExecutionContext,
    mount_point: &Path,
    tracker: &ProcessTracker,
) -> Result<UnmountOutcome> {
    let output = ctx.run("umount", &[mount_point.display().to_string()])?;

    let outcome = if output.success() {
        info!("unmounted {}", mount_point.display());
        UnmountOutcome::Unmounted
    } else if is_not_mounted_error(mount_point, &output.stderr) {
        debug!("{} is not mounted", mount_point.display());
        UnmountOutcome::NotMounted
    } else {
        return Err(Error::Unmount {
            path: mount_point.to_path_buf(),
            message: output.stderr,
        });
    };

    if let Some(pid) = tracker.take(mount_point) {
        reap(pid);
    }

    Ok(outcome)
}

/// Checks if `umount` stderr means there was nothing to unmount.
fn is_not_mounted_error(mount_point: &Path, stderr: &str) -> bool {
    let not_mounted = format!("umount: {}: not mounted", mount_point.display());

    stderr.contains(&not_mounted) || stderr.to_lowercase().contains("no such file or directory")
}
