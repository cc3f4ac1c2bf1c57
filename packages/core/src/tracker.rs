//! Tracking of FUSE daemon processes by mount point.
//!
//! A `ceph-fuse` mount leaves a daemon behind. Its PID is recorded here when
//! the mount succeeds and taken back out when the mount point is unmounted, so
//! the daemon can be reaped instead of lingering as a zombie.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use parking_lot::Mutex;

/// Maps a mount point to the PID of its FUSE daemon.
///
/// The lock is only held for the map operation itself, never across a
/// subprocess invocation.
#[derive(Debug, Default)]
pub struct ProcessTracker {
    pids: Mutex<HashMap<PathBuf, i32>>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the daemon PID for `mount_point`, returning any PID it replaced.
    pub fn record(&self, mount_point: &Path, pid: i32) -> Option<i32> {
        let previous = self.pids.lock().insert(mount_point.to_path_buf(), pid);
        if let Some(old) = previous {
            warn!(
                "replacing FUSE daemon {} for {} with {}",
                old,
                mount_point.display(),
                pid
            );
        }
        previous
    }

    /// Removes and returns the daemon PID recorded for `mount_point`.
    pub fn take(&self, mount_point: &Path) -> Option<i32> {
        self.pids.lock().remove(mount_point)
    }

    pub fn get(&self, mount_point: &Path) -> Option<i32> {
        self.pids.lock().get(mount_point).copied()
    }

    pub fn len(&self) -> usize {
        self.pids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.lock().is_empty()
    }
}

/// Result of a best-effort reap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    Reaped,
    /// No such process; it already exited and was collected elsewhere.
    NotFound,
    /// The process exists but is not a child of this process.
    NotChild,
}

/// Waits on a FUSE daemon after its mount is gone.
///
/// Failures are logged and reported through the outcome, never as errors:
/// by the time this runs the unmount itself has already succeeded.
pub fn reap(pid: i32) -> ReapOutcome {
    let target = Pid::from_raw(pid);

    if let Err(Errno::ESRCH) = kill(target, None) {
        warn!("failed to find process {}: {}", pid, Errno::ESRCH);
        return ReapOutcome::NotFound;
    }

    match waitpid(target, None) {
        Ok(status) => {
            debug!("reaped FUSE daemon {}: {:?}", pid, status);
            ReapOutcome::Reaped
        }
        Err(errno) => {
            warn!("{} is not a child process: {}", pid, errno);
            ReapOutcome::NotChild
        }
    }
}
