//! Mounter configuration.
//!
//! Loaded from an optional JSON file; every field has a default so an empty
//! object (or no file at all) is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{ConfigParseSnafu, IoResultExt, Result};
use crate::executor::{ExecutionContext, PrivilegeEscalation};

/// Default Ceph configuration file passed to `ceph-fuse`.
pub const DEFAULT_CEPH_CONFIG_PATH: &str = "/etc/ceph/ceph.conf";

/// Prefix turning a bare ID into a Ceph entity name.
pub const DEFAULT_ENTITY_PREFIX: &str = "client.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MounterConfig {
    /// Load the kernel client even if the running kernel is not known to
    /// support quotas.
    pub force_kernel_client: bool,
    pub ceph_config_path: PathBuf,
    pub entity_prefix: String,
    pub escalation: PrivilegeEscalation,
}

impl Default for MounterConfig {
    fn default() -> Self {
        Self {
            force_kernel_client: false,
            ceph_config_path: PathBuf::from(DEFAULT_CEPH_CONFIG_PATH),
            entity_prefix: DEFAULT_ENTITY_PREFIX.to_string(),
            escalation: PrivilegeEscalation::None,
        }
    }
}

impl MounterConfig {
    /// Reads a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).config_read_context(path)?;
        serde_json::from_str(&content).context(ConfigParseSnafu { path })
    }

    /// Execution context honoring the configured escalation method.
    pub fn execution_context(&self) -> ExecutionContext {
        ExecutionContext::with_escalation(self.escalation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_defaults() {
        let config = MounterConfig::default();
        assert!(!config.force_kernel_client);
        assert_eq!(config.ceph_config_path, Path::new("/etc/ceph/ceph.conf"));
        assert_eq!(config.entity_prefix, "client.");
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mounter.json");
        std::fs::write(
            &path,
            r#"{"force_kernel_client": true, "escalation": "sudo"}"#,
        )
        .unwrap();

        let config = MounterConfig::from_file(&path).unwrap();

        assert!(config.force_kernel_client);
        assert_eq!(config.escalation, PrivilegeEscalation::Sudo);
        assert_eq!(config.entity_prefix, "client.");
        assert_eq!(
            config.execution_context().escalation(),
            PrivilegeEscalation::Sudo
        );
    }

    #[test]
    fn test_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            MounterConfig::from_file(&missing),
            Err(Error::ConfigRead { .. })
        ));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "force_kernel_client = true").unwrap();
        assert!(matches!(
            MounterConfig::from_file(&garbage),
            Err(Error::ConfigParse { .. })
        ));
    }
}
