//! Protocol types for the long-lived mounter daemon.
//!
//! Requests and responses are newline-delimited JSON exchanged over the
//! daemon's stdin and stdout (`cephfs-mount-cli daemon`). A daemon owns one
//! [`MounterRegistry`](crate::MounterRegistry) for its whole life, so FUSE
//! daemons it mounts can be reaped when it later unmounts them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::volume::{Credentials, VolumeOptions};

/// Request sent to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    /// Request ID (must be strictly increasing).
    pub id: u64,
    /// The actual command.
    #[serde(flatten)]
    pub cmd: DaemonCommand,
}

/// Command types for the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonCommand {
    /// Mount a CephFS volume.
    Mount {
        mount_point: PathBuf,
        credentials: Credentials,
        options: VolumeOptions,
    },
    /// Bind-mount an existing mount, optionally read-only.
    BindMount {
        from: PathBuf,
        to: PathBuf,
        #[serde(default)]
        read_only: bool,
        #[serde(default)]
        options: Vec<String>,
    },
    /// Unmount a path.
    Unmount { mount_point: PathBuf },
    /// Report the mechanisms loaded at startup and why the others were not.
    Probe,
    /// Shutdown the daemon.
    Shutdown,
}

/// Response from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    /// Request ID this response corresponds to.
    pub id: u64,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Command specific result, e.g. the mounter used or the unmount outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    /// Error message if success is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(id: u64, detail: Option<serde_json::Value>) -> Self {
        Self {
            id,
            success: true,
            detail,
            error: None,
        }
    }

    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            detail: None,
            error: Some(message.into()),
        }
    }
}
