//! CephFS mount drivers.
//!
//! Two client mechanisms are supported: the in-kernel client driven through
//! `mount -t ceph`, and the `ceph-fuse` user-space daemon. Both are wrapped in
//! [`VolumeMounter`] so callers dispatch on a closed set.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use crate::config::MounterConfig;
use crate::error::{DaemonOutputSnafu, DaemonPidSnafu, Error, Result};
use crate::executor::ExecutionContext;
use crate::mount::{create_mount_point, mount_options_add};
use crate::tracker::ProcessTracker;
use crate::volume::{Credentials, VolumeOptions};

/// Filesystem type passed to `mount -t`.
pub const FS_TYPE: &str = "ceph";

/// Kernel module providing the CephFS client.
pub const KERNEL_MODULE: &str = "ceph";

/// User-space client binary.
pub const FUSE_BINARY: &str = "ceph-fuse";

/// Keeps the mount across network reconfiguration.
const NET_DEV: &str = "_netdev";

/// Default FUSE option; the mount point may already contain files.
const FUSE_DEFAULT_OPTIONS: &str = "nonempty";

/// Client mechanism used to attach a CephFS volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MounterKind {
    Kernel,
    Fuse,
}

impl MounterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kernel => "kernel",
            Self::Fuse => "fuse",
        }
    }
}

impl fmt::Display for MounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MounterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "kernel" => Ok(Self::Kernel),
            "fuse" => Ok(Self::Fuse),
            _ => Err(Error::UnknownMounter {
                name: s.to_string(),
            }),
        }
    }
}

/// Mounts through the in-kernel CephFS client.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelMounter;

impl KernelMounter {
    pub fn mount(
        &self,
        ctx: &ExecutionContext,
        mount_point: &Path,
        cr: &Credentials,
        opts: &VolumeOptions,
    ) -> Result<()> {
        create_mount_point(mount_point)?;

        let output = ctx.run("modprobe", &[KERNEL_MODULE.to_string()])?;
        if !output.success() {
            return Err(Error::ModuleLoad {
                module: KERNEL_MODULE.to_string(),
                stderr: output.stderr,
            });
        }

        let output = ctx.run("mount", &kernel_mount_args(mount_point, cr, opts))?;
        if !output.success() {
            return Err(Error::Mount {
                mounter: MounterKind::Kernel,
                path: mount_point.to_path_buf(),
                stderr: output.stderr,
            });
        }

        info!("mounted {} with the kernel client", mount_point.display());
        Ok(())
    }
}

/// Arguments for `mount` when using the kernel client.
fn kernel_mount_args(mount_point: &Path, cr: &Credentials, opts: &VolumeOptions) -> Vec<String> {
    let identity = format!("name={},secretfile={}", cr.id, cr.key_file.display());
    let namespace = opts
        .fs_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(|name| format!("mds_namespace={name}"))
        .unwrap_or_default();
    let options = mount_options_add(
        &identity,
        &[
            namespace.as_str(),
            opts.kernel_mount_options.as_deref().unwrap_or_default(),
            NET_DEV,
        ],
    );

    vec![
        "-t".to_string(),
        FS_TYPE.to_string(),
        format!("{}:{}", opts.monitors, opts.root_path),
        mount_point.display().to_string(),
        "-o".to_string(),
        options,
    ]
}

/// Mounts through a `ceph-fuse` daemon and tracks its PID.
#[derive(Debug, Clone, Copy)]
pub struct FuseMounter<'a> {
    config: &'a MounterConfig,
    tracker: &'a ProcessTracker,
}

impl<'a> FuseMounter<'a> {
    pub fn new(config: &'a MounterConfig, tracker: &'a ProcessTracker) -> Self {
        Self { config, tracker }
    }

    /// Mounts the volume and records the daemon PID.
    ///
    /// A zero exit without a recognizable daemon announcement is still a
    /// failure: without the PID the daemon could never be reaped. The mount is
    /// left in place and the caller is expected to unmount it.
    pub fn mount(
        &self,
        ctx: &ExecutionContext,
        mount_point: &Path,
        cr: &Credentials,
        opts: &VolumeOptions,
    ) -> Result<()> {
        create_mount_point(mount_point)?;

        let output = ctx.run(FUSE_BINARY, &self.args(mount_point, cr, opts))?;
        if !output.success() {
            return Err(Error::Mount {
                mounter: MounterKind::Fuse,
                path: mount_point.to_path_buf(),
                stderr: output.stderr,
            });
        }

        let pid = parse_daemon_pid(&output.stderr)?;
        self.tracker.record(mount_point, pid);

        info!(
            "mounted {} with ceph-fuse daemon {}",
            mount_point.display(),
            pid
        );
        Ok(())
    }

    fn args(&self, mount_point: &Path, cr: &Credentials, opts: &VolumeOptions) -> Vec<String> {
        let mut args = vec![
            mount_point.display().to_string(),
            "-m".to_string(),
            opts.monitors.clone(),
            "-c".to_string(),
            self.config.ceph_config_path.display().to_string(),
            "-n".to_string(),
            format!("{}{}", self.config.entity_prefix, cr.id),
            format!("--keyfile={}", cr.key_file.display()),
            "-r".to_string(),
            opts.root_path.clone(),
        ];

        let mut fmo = FUSE_DEFAULT_OPTIONS.to_string();
        if let Some(extra) = opts.fuse_mount_options.as_deref().map(str::trim) {
            if !extra.is_empty() {
                fmo.push(',');
                fmo.push_str(extra);
            }
        }
        args.push("-o".to_string());
        args.push(fmo);

        if let Some(name) = opts.fs_name.as_deref().filter(|name| !name.is_empty()) {
            args.push(format!("--client_mds_namespace={name}"));
        }

        args
    }
}

const DAEMON_PREFIX: &str = "ceph-fuse[";
const DAEMON_SUFFIX: &str = "]: starting fuse";

/// Extracts the daemon PID from `ceph-fuse` stderr.
///
/// Exactly one line of the form `ceph-fuse[<pid>]: starting fuse` must be
/// present, and `<pid>` must be a positive integer.
pub fn parse_daemon_pid(stderr: &str) -> Result<i32> {
    let mut found = stderr.lines().filter_map(|line| {
        line.trim_end()
            .strip_prefix(DAEMON_PREFIX)?
            .strip_suffix(DAEMON_SUFFIX)
    });

    let (Some(value), None) = (found.next(), found.next()) else {
        return DaemonOutputSnafu { stderr }.fail();
    };

    let pid: i32 = value.parse().context(DaemonPidSnafu { value })?;
    ensure!(pid > 0, DaemonOutputSnafu { stderr });
    Ok(pid)
}

/// A mount driver selected by the registry.
#[derive(Debug, Clone, Copy)]
pub enum VolumeMounter<'a> {
    Kernel(KernelMounter),
    Fuse(FuseMounter<'a>),
}

impl VolumeMounter<'_> {
    pub fn kind(&self) -> MounterKind {
        match self {
            Self::Kernel(_) => MounterKind::Kernel,
            Self::Fuse(_) => MounterKind::Fuse,
        }
    }

    /// Human readable driver name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Kernel(_) => "Ceph kernel client",
            Self::Fuse(_) => "Ceph FUSE driver",
        }
    }

    pub fn mount(
        &self,
        ctx: &ExecutionContext,
        mount_point: &Path,
        cr: &Credentials,
        opts: &VolumeOptions,
    ) -> Result<()> {
        match self {
            Self::Kernel(m) => m.mount(ctx, mount_point, cr, opts),
            Self::Fuse(m) => m.mount(ctx, mount_point, cr, opts),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::executor::testing::{ScriptedRunner, context};

    fn credentials() -> Credentials {
        Credentials {
            id: "csi-user".to_string(),
            key_file: PathBuf::from("/tmp/csi/keys/key"),
        }
    }

    fn options() -> VolumeOptions {
        VolumeOptions {
            monitors: "10.0.0.1:6789,10.0.0.2:6789".to_string(),
            root_path: "/volumes/csi/vol-1".to_string(),
            ..VolumeOptions::default()
        }
    }

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mounter_kind_from_str() {
        assert_eq!(
            "kernel".parse::<MounterKind>().unwrap(),
            MounterKind::Kernel
        );
        assert_eq!(" FUSE ".parse::<MounterKind>().unwrap(), MounterKind::Fuse);
        assert!(matches!(
            "nfs".parse::<MounterKind>(),
            Err(Error::UnknownMounter { .. })
        ));
    }

    #[test]
    fn test_parse_daemon_pid() {
        assert_eq!(
            parse_daemon_pid("ceph-fuse[1234]: starting fuse").unwrap(),
            1234
        );
        assert_eq!(
            parse_daemon_pid(
                "2024-01-01 ceph-fuse: starting ceph client\nceph-fuse[77]: starting fuse\n"
            )
            .unwrap(),
            77
        );
    }

    #[test]
    fn test_parse_daemon_pid_rejects_malformed_output() {
        assert!(matches!(
            parse_daemon_pid(""),
            Err(Error::DaemonOutput { .. })
        ));
        assert!(matches!(
            parse_daemon_pid("ceph-fuse[1234]: starting ceph client"),
            Err(Error::DaemonOutput { .. })
        ));
        assert!(matches!(
            parse_daemon_pid("ceph-fuse[1]: starting fuse\nceph-fuse[2]: starting fuse"),
            Err(Error::DaemonOutput { .. })
        ));
        assert!(matches!(
            parse_daemon_pid("ceph-fuse[abc]: starting fuse"),
            Err(Error::DaemonPid { .. })
        ));
        assert!(matches!(
            parse_daemon_pid("ceph-fuse[0]: starting fuse"),
            Err(Error::DaemonOutput { .. })
        ));
    }

    #[test]
    fn test_kernel_mount_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let mount_point = dir.path().join("vol");
        let runner = ScriptedRunner::new();
        let opts = VolumeOptions {
            fs_name: Some("cephfs".to_string()),
            kernel_mount_options: Some("recover_session=clean".to_string()),
            ..options()
        };

        KernelMounter
            .mount(&context(&runner), &mount_point, &credentials(), &opts)
            .unwrap();

        assert!(mount_point.is_dir());
        let target = mount_point.display().to_string();
        assert_eq!(
            runner.calls(),
            vec![
                strings(&["modprobe", "ceph"]),
                strings(&[
                    "mount",
                    "-t",
                    "ceph",
                    "10.0.0.1:6789,10.0.0.2:6789:/volumes/csi/vol-1",
                    &target,
                    "-o",
                    "name=csi-user,secretfile=/tmp/csi/keys/key,mds_namespace=cephfs,\
                     recover_session=clean,_netdev",
                ]),
            ]
        );
    }

    #[test]
    fn test_kernel_mount_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        runner.push_ok("");
        runner.push_err(32, "mount error 13 = Permission denied");

        let err = KernelMounter
            .mount(&context(&runner), dir.path(), &credentials(), &options())
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Mount {
                mounter: MounterKind::Kernel,
                ..
            }
        ));
        assert_eq!(err.stderr(), Some("mount error 13 = Permission denied"));
    }

    #[test]
    fn test_kernel_module_failure_stops_mount() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        runner.push_err(1, "modprobe: FATAL: Module ceph not found");

        let err = KernelMounter
            .mount(&context(&runner), dir.path(), &credentials(), &options())
            .unwrap_err();

        assert!(matches!(err, Error::ModuleLoad { .. }));
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_fuse_mount_records_pid() {
        let dir = tempfile::tempdir().unwrap();
        let config = MounterConfig::default();
        let tracker = ProcessTracker::new();
        let runner = ScriptedRunner::new();
        runner.push_ok("ceph-fuse[1234]: starting fuse\n");
        let opts = VolumeOptions {
            fs_name: Some("cephfs".to_string()),
            fuse_mount_options: Some(" debug ".to_string()),
            ..options()
        };

        FuseMounter::new(&config, &tracker)
            .mount(&context(&runner), dir.path(), &credentials(), &opts)
            .unwrap();

        assert_eq!(tracker.get(dir.path()), Some(1234));
        let target = dir.path().display().to_string();
        assert_eq!(
            runner.calls(),
            vec![strings(&[
                "ceph-fuse",
                &target,
                "-m",
                "10.0.0.1:6789,10.0.0.2:6789",
                "-c",
                "/etc/ceph/ceph.conf",
                "-n",
                "client.csi-user",
                "--keyfile=/tmp/csi/keys/key",
                "-r",
                "/volumes/csi/vol-1",
                "-o",
                "nonempty,debug",
                "--client_mds_namespace=cephfs",
            ])]
        );
    }

    #[test]
    fn test_fuse_mount_without_announcement_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = MounterConfig::default();
        let tracker = ProcessTracker::new();
        let runner = ScriptedRunner::new();
        runner.push_ok("ceph-fuse: mounted, but quietly\n");

        let err = FuseMounter::new(&config, &tracker)
            .mount(&context(&runner), dir.path(), &credentials(), &options())
            .unwrap_err();

        assert!(matches!(err, Error::DaemonOutput { .. }));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_fuse_mount_failure_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = MounterConfig::default();
        let tracker = ProcessTracker::new();
        let runner = ScriptedRunner::new();
        runner.push_err(1, "ceph-fuse[99]: starting fuse\nfuse: mount failed");

        let err = FuseMounter::new(&config, &tracker)
            .mount(&context(&runner), dir.path(), &credentials(), &options())
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Mount {
                mounter: MounterKind::Fuse,
                ..
            }
        ));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_volume_mounter_names() {
        let config = MounterConfig::default();
        let tracker = ProcessTracker::new();
        let fuse = VolumeMounter::Fuse(FuseMounter::new(&config, &tracker));

        assert_eq!(
            VolumeMounter::Kernel(KernelMounter).name(),
            "Ceph kernel client"
        );
        assert_eq!(fuse.name(), "Ceph FUSE driver");
        assert_eq!(fuse.kind(), MounterKind::Fuse);
    }
}
