//! Kernel version detection and capability matching.
//!
//! The kernel CephFS client is only trusted when the running kernel supports
//! quotas: upstream 4.17 or newer, or a vendor kernel known to carry the
//! backport.

use std::cmp::Ordering;

use crate::error::{Error, Result};

/// A kernel release, either a running kernel or a threshold in a support table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelVersion {
    pub major: u32,
    pub patch: u32,
    pub sublevel: u32,
    pub extra: u32,
    /// Distribution suffix such as `.el7` (may carry the arch, e.g. `.el7.x86_64`).
    pub distribution: String,
    /// Backport entries only match the exact numbers with the same distribution.
    pub backport: bool,
}

impl KernelVersion {
    /// Upstream threshold: matches this version or anything newer.
    pub fn minimum(major: u32, patch: u32, sublevel: u32) -> Self {
        Self {
            major,
            patch,
            sublevel,
            extra: 0,
            distribution: String::new(),
            backport: false,
        }
    }

    /// Vendor threshold: matches only this exact release on `distribution`.
    pub fn backport(major: u32, patch: u32, sublevel: u32, extra: u32, distribution: &str) -> Self {
        Self {
            major,
            patch,
            sublevel,
            extra,
            distribution: distribution.to_string(),
            backport: true,
        }
    }

    /// Parses a `uname -r` style release.
    ///
    /// `3.10.0-1062.el7.x86_64` yields 3, 10, 0, 1062 with distribution
    /// `.el7.x86_64`. A non-numeric suffix such as `-rc5` leaves `extra` at 0.
    pub fn parse_release(release: &str) -> Result<Self> {
        let invalid = || Error::KernelRelease {
            release: release.to_string(),
        };

        let (major, rest) = leading_number(release).ok_or_else(invalid)?;
        let rest = rest.strip_prefix('.').ok_or_else(invalid)?;
        let (patch, mut rest) = leading_number(rest).ok_or_else(invalid)?;

        let mut sublevel = 0;
        if let Some(tail) = rest.strip_prefix('.') {
            match leading_number(tail) {
                Some((value, tail)) => {
                    sublevel = value;
                    rest = tail;
                }
                None => return Err(invalid()),
            }
        }

        let mut extra = 0;
        if let Some((value, tail)) = rest.strip_prefix('-').and_then(leading_number) {
            extra = value;
            rest = tail;
        }

        Ok(Self {
            major,
            patch,
            sublevel,
            extra,
            distribution: rest.to_string(),
            backport: false,
        })
    }

    fn numbers(&self) -> (u32, u32, u32, u32) {
        (self.major, self.patch, self.sublevel, self.extra)
    }

    fn same_distribution(&self, rule: &KernelVersion) -> bool {
        rule.distribution.is_empty() || self.distribution.contains(&rule.distribution)
    }

    /// Whether this (running) version satisfies a single table entry.
    pub fn satisfies(&self, rule: &KernelVersion) -> bool {
        if !self.same_distribution(rule) {
            return false;
        }

        if rule.backport {
            self.numbers() == rule.numbers()
        } else {
            self.numbers().cmp(&rule.numbers()) != Ordering::Less
        }
    }
}

fn leading_number(s: &str) -> Option<(u32, &str)> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

/// Kernels whose CephFS client supports quotas.
pub fn quota_support() -> Vec<KernelVersion> {
    vec![
        // upstream 4.17+
        KernelVersion::minimum(4, 17, 0),
        // RHEL-7.7
        KernelVersion::backport(3, 10, 0, 1062, ".el7"),
    ]
}

/// Returns true if `running` matches any entry of `table`, or `force` is set.
pub fn is_supported(running: &KernelVersion, table: &[KernelVersion], force: bool) -> bool {
    force || table.iter().any(|rule| running.satisfies(rule))
}

/// Release string of the running kernel, as reported by `uname(2)`.
pub fn running_release() -> Result<String> {
    let uts = nix::sys::utsname::uname().map_err(|errno| Error::CommandExecution {
        command: "uname".to_string(),
        source: errno.into(),
    })?;
    Ok(uts.release().to_string_lossy().into_owned())
}
