//! Host capability aggregation.
//!
//! Combines the cgroup capability matrix with the security and networking
//! flags a monitoring layer typically reports alongside it.

mod apparmor;

pub use apparmor::{AppArmor, Profile};

use std::path::Path;

use crate::cgroup::{self, Info, ProbeError, Warning};
use crate::fsutil;

const PROC_SELF_STATUS: &str = "/proc/self/status";
const IP_FORWARD_PATH: &str = "/proc/sys/net/ipv4/ip_forward";
const SECCOMP_FIELD: &str = "Seccomp:";

/// Cgroup capability matrix plus host security and networking flags.
#[derive(Debug)]
pub struct SysInfo {
    pub info: Info,

    /// Whether the kernel supports AppArmor and its profile listing is
    /// readable.
    pub apparmor: bool,

    /// Whether the kernel supports seccomp.
    pub seccomp: bool,

    /// Whether IPv4 forwarding is disabled; networking for containers will
    /// not work in that case.
    pub ipv4_forwarding_disabled: bool,

    /// Warnings collected while probing. Informational messages for the
    /// user, not meant to be parsed.
    pub warnings: Vec<Warning>,
}

/// Collects host capabilities for the given cgroup path (empty means the
/// cgroup root).
///
/// # Errors
///
/// Fails only when capability probing itself fails; every additional flag
/// degrades to false on unreadable sources.
pub fn collect(path: &str) -> Result<SysInfo, ProbeError> {
    let (info, warnings) = cgroup::probe(path)?;

    let apparmor = AppArmor::new();

    Ok(SysInfo {
        info,
        apparmor: apparmor.supported() && apparmor.profiles_accessible(),
        seccomp: seccomp_supported_from(Path::new(PROC_SELF_STATUS)),
        ipv4_forwarding_disabled: !read_proc_bool(Path::new(IP_FORWARD_PATH)),
        warnings,
    })
}

/// Returns true if the process status file carries a seccomp field, i.e.
/// the kernel was built with seccomp support.
fn seccomp_supported_from(path: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return false;
    };

    contents.lines().any(|line| line.starts_with(SECCOMP_FIELD))
}

fn read_proc_bool(path: &Path) -> bool {
    fsutil::read_trimmed(path).is_some_and(|v| v == "1")
}
