//! Inputs describing what to mount and as whom.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::mounter::MounterKind;

/// Ceph identity used for a mount. Provided by the caller, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Entity ID without the `client.` prefix.
    pub id: String,
    /// File holding the secret key.
    pub key_file: PathBuf,
}

/// Per-volume mount parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeOptions {
    /// Comma-separated monitor addresses.
    pub monitors: String,
    /// Path inside CephFS to mount.
    pub root_path: String,
    /// CephFS filesystem name, when the cluster hosts more than one.
    pub fs_name: Option<String>,
    /// Preferred client mechanism; the first available one is used otherwise.
    pub mounter: Option<MounterKind>,
    pub kernel_mount_options: Option<String>,
    pub fuse_mount_options: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_options_from_json() {
        let opts: VolumeOptions = serde_json::from_str(
            r#"{"monitors":"mon1:6789","root_path":"/volumes/a","mounter":"fuse"}"#,
        )
        .unwrap();

        assert_eq!(opts.monitors, "mon1:6789");
        assert_eq!(opts.mounter, Some(MounterKind::Fuse));
        assert_eq!(opts.fs_name, None);
    }
}
