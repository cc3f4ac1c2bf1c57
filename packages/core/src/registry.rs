//! Discovery and selection of CephFS client mechanisms.
//!
//! The registry is built once at startup by probing the host, then shared by
//! reference with every mount and unmount call. It also owns the
//! [`ProcessTracker`] for FUSE daemons, so the instance that mounted a volume
//! must be the one that unmounts it.

use std::path::Path;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::config::MounterConfig;
use crate::error::{Error, Result};
use crate::executor::ExecutionContext;
use crate::kernel::{self, KernelVersion};
use crate::mount::{UnmountOutcome, unmount_volume};
use crate::mounter::{FUSE_BINARY, FuseMounter, KernelMounter, MounterKind, VolumeMounter};
use crate::tracker::ProcessTracker;
use crate::volume::{Credentials, VolumeOptions};

/// Helper whose presence means the kernel client can be driven by `mount`.
const KERNEL_PROBE: &str = "mount.ceph";

/// Why a mechanism was or was not loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeStatus {
    Available,
    Unavailable { reason: String },
    UnsupportedKernel { release: String },
}

/// Probe result for a single mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub mounter: MounterKind,
    #[serde(flatten)]
    pub status: ProbeStatus,
}

/// Mechanisms usable on this host, plus the state shared by their drivers.
#[derive(Debug)]
pub struct MounterRegistry {
    available: Vec<MounterKind>,
    reports: Vec<ProbeReport>,
    config: MounterConfig,
    tracker: ProcessTracker,
}

impl MounterRegistry {
    /// Probes the host for mount helpers and builds the registry.
    ///
    /// Fails with [`Error::NoMounters`] if neither mechanism is usable.
    pub fn load(ctx: &ExecutionContext, config: MounterConfig) -> Result<Self> {
        Self::load_with(ctx, config, kernel::running_release)
    }

    /// Like [`MounterRegistry::load`], with the kernel release supplied by `release`.
    pub fn load_with<F>(ctx: &ExecutionContext, config: MounterConfig, release: F) -> Result<Self>
    where
        F: FnOnce() -> Result<String>,
    {
        let kernel = probe_kernel(ctx, &config, release)?;
        let fuse = probe(ctx, FUSE_BINARY, &["--version".to_string()]);

        let reports = vec![
            ProbeReport {
                mounter: MounterKind::Kernel,
                status: kernel,
            },
            ProbeReport {
                mounter: MounterKind::Fuse,
                status: fuse,
            },
        ];

        let available = reports
            .iter()
            .filter(|report| report.status == ProbeStatus::Available)
            .map(|report| {
                info!("loaded mounter: {}", report.mounter);
                report.mounter
            })
            .collect();

        let mut registry = Self::with_available(available, config)?;
        registry.reports = reports;
        Ok(registry)
    }

    /// Builds a registry from an already known set of mechanisms, in preference order.
    ///
    /// Every listed mechanism is reported as available; the rest as not probed.
    pub fn with_available(available: Vec<MounterKind>, config: MounterConfig) -> Result<Self> {
        if available.is_empty() {
            return Err(Error::NoMounters);
        }

        let reports = [MounterKind::Kernel, MounterKind::Fuse]
            .into_iter()
            .map(|mounter| ProbeReport {
                mounter,
                status: if available.contains(&mounter) {
                    ProbeStatus::Available
                } else {
                    ProbeStatus::Unavailable {
                        reason: "not probed".to_string(),
                    }
                },
            })
            .collect();

        Ok(Self {
            available,
            reports,
            config,
            tracker: ProcessTracker::new(),
        })
    }

    pub fn available(&self) -> &[MounterKind] {
        &self.available
    }

    /// Why each mechanism was or was not loaded, in probe order.
    pub fn probe_reports(&self) -> &[ProbeReport] {
        &self.reports
    }

    pub fn config(&self) -> &MounterConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ProcessTracker {
        &self.tracker
    }

    /// Returns the driver for `preferred`, or for the first available
    /// mechanism if `preferred` is absent or not usable on this host.
    pub fn new_mounter(&self, preferred: Option<MounterKind>) -> Result<VolumeMounter<'_>> {
        let chosen = match preferred {
            Some(kind) if self.available.contains(&kind) => kind,
            _ => {
                let fallback = self.available.first().copied().ok_or(Error::NoMounters)?;
                debug!(
                    "requested mounter: {}, chosen mounter: {}",
                    preferred.map_or("<none>", |kind| kind.as_str()),
                    fallback
                );
                fallback
            }
        };

        Ok(match chosen {
            MounterKind::Kernel => VolumeMounter::Kernel(KernelMounter),
            MounterKind::Fuse => VolumeMounter::Fuse(FuseMounter::new(&self.config, &self.tracker)),
        })
    }

    /// Mounts a volume with the mechanism chosen for `opts.mounter`.
    pub fn mount(
        &self,
        ctx: &ExecutionContext,
        mount_point: &Path,
        cr: &Credentials,
        opts: &VolumeOptions,
    ) -> Result<MounterKind> {
        let mounter = self.new_mounter(opts.mounter)?;
        debug!(
            "mounting {} using {}",
            mount_point.display(),
            mounter.name()
        );
        mounter.mount(ctx, mount_point, cr, opts)?;
        Ok(mounter.kind())
    }

    /// Unmounts a volume, reaping its FUSE daemon if this registry mounted it.
    pub fn unmount(&self, ctx: &ExecutionContext, mount_point: &Path) -> Result<UnmountOutcome> {
        unmount_volume(ctx, mount_point, &self.tracker)
    }
}

fn probe_kernel<F>(
    ctx: &ExecutionContext,
    config: &MounterConfig,
    release: F,
) -> Result<ProbeStatus>
where
    F: FnOnce() -> Result<String>,
{
    let status = probe(ctx, KERNEL_PROBE, &[]);
    if status != ProbeStatus::Available {
        return Ok(status);
    }

    let release = release()?;
    let running = KernelVersion::parse_release(&release)?;

    let table = kernel::quota_support();
    if kernel::is_supported(&running, &table, config.force_kernel_client) {
        Ok(ProbeStatus::Available)
    } else {
        info!(
            "kernel {} < 4.17 might not support quota feature, hence not loading kernel client",
            release
        );
        Ok(ProbeStatus::UnsupportedKernel { release })
    }
}

fn probe(ctx: &ExecutionContext, program: &str, args: &[String]) -> ProbeStatus {
    match ctx.run(program, args) {
        Ok(output) if output.success() => ProbeStatus::Available,
        Ok(output) => {
            let reason = format!(
                "exited with code {}: {}",
                output.code.unwrap_or(-1),
                output.stderr.trim()
            );
            error!("failed to run {}: {}", program, reason);
            ProbeStatus::Unavailable { reason }
        }
        Err(err) => {
            error!("failed to run {}: {}", program, err);
            ProbeStatus::Unavailable {
                reason: err.to_string(),
            }
        }
    }
}
