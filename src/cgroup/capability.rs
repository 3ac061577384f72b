//! Cgroup controller capability detection.
//!
//! Probing loads the controller list for a cgroup path and turns it into a
//! flat capability matrix ([`Info`]) plus a list of non-fatal [`Warning`]s,
//! one per missing controller. Only the controller-list load itself can
//! fail; every other read degrades to a documented default.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::fsutil;

use super::version::CGROUP_ROOT;

const CONTROLLERS_FILE: &str = "cgroup.controllers";
const MEMORY_SWAP_MAX_FILE: &str = "memory.swap.max";
const CPUSET_CPUS_EFFECTIVE_FILE: &str = "cpuset.cpus.effective";
const CPUSET_MEMS_EFFECTIVE_FILE: &str = "cpuset.mems.effective";
const PROC_SELF_CGROUP: &str = "/proc/self/cgroup";
const PROC_SELF_UID_MAP: &str = "/proc/self/uid_map";
const CGROUP_NS_PATH: &str = "/proc/self/ns/cgroup";

/// Recognized cgroup controller identifiers. Detection keys only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Controller {
    Memory,
    Cpu,
    Io,
    Cpuset,
    Pids,
}

impl Controller {
    pub fn as_str(self) -> &'static str {
        match self {
            Controller::Memory => "memory",
            Controller::Cpu => "cpu",
            Controller::Io => "io",
            Controller::Cpuset => "cpuset",
            Controller::Pids => "pids",
        }
    }
}

/// A controller expected by the capability matrix was absent from the
/// probed path's controller list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Warning {
    #[error("no memory controller found")]
    NoMemoryController,
    #[error("no cpu controller found")]
    NoCpuController,
    #[error("no io controller found")]
    NoIoController,
    #[error("no cpuset controller found")]
    NoCpusetController,
    #[error("no pids controller found")]
    NoPidsController,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to load controller list from `{path}`: {source}")]
    ControllerList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Capability matrix for one cgroup path.
///
/// A flat value type; fields are grouped by documentation only. Every
/// boolean is true only when the corresponding controller appeared in the
/// controller list of the probed path.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Info {
    // Memory.
    /// Whether memory limits are supported.
    pub memory_limit: bool,
    /// Whether a swap limit is supported.
    pub swap_limit: bool,
    /// Whether a soft memory limit is supported.
    pub memory_reservation: bool,
    /// Whether disabling the OOM killer is supported. No v2 interface
    /// exists; always false here.
    pub oom_kill_disable: bool,
    /// Whether memory swappiness is supported. No v2 interface exists;
    /// always false here.
    pub memory_swappiness: bool,
    /// Whether a kernel memory limit is supported. Not supported on
    /// cgroup v2 (and removed in kernel 5.4); kept for API symmetry with
    /// legacy systems.
    pub kernel_memory: bool,
    /// Whether a kernel memory TCP limit is supported. Not supported on
    /// cgroup v2; kept for API symmetry with legacy systems.
    pub kernel_memory_tcp: bool,

    // CPU.
    /// Whether CPU shares are supported.
    pub cpu_shares: bool,
    /// Whether the CPU CFS bandwidth controller is supported.
    pub cpu_cfs: bool,
    /// Whether the CPU real-time scheduler is supported.
    pub cpu_realtime: bool,

    // Block I/O.
    /// Whether block I/O weight is supported.
    pub blkio_weight: bool,
    /// Whether per-device block I/O weight is supported.
    pub blkio_weight_device: bool,
    /// Whether per-device read limits in bytes per second are supported.
    pub blkio_read_bps_device: bool,
    /// Whether per-device write limits in bytes per second are supported.
    pub blkio_write_bps_device: bool,
    /// Whether per-device read limits in operations per second are supported.
    pub blkio_read_iops_device: bool,
    /// Whether per-device write limits in operations per second are supported.
    pub blkio_write_iops_device: bool,

    // Cpuset.
    /// Whether the cpuset controller is enabled.
    pub cpuset: bool,
    /// Raw effective CPU list of the probed path, kernel list format.
    pub cpus: String,
    /// Raw effective memory-node list of the probed path, kernel list format.
    pub mems: String,

    // Pids.
    /// Whether a pids limit is supported.
    pub pids_limit: bool,

    // Generic.
    /// Whether the devices cgroup is usable, i.e. the process is not
    /// confined to a restricted user namespace.
    pub cgroup_devices_enabled: bool,
    /// Whether the kernel supports cgroup namespaces.
    pub cgroup_namespaces: bool,
}

/// Probes the controllers active for `path` (relative to the unified cgroup
/// root; empty means the root itself) and builds the capability matrix.
///
/// Missing controllers produce warnings, never errors.
///
/// # Errors
///
/// Returns [`ProbeError::ControllerList`] if the controller list itself
/// cannot be loaded; no partial [`Info`] is returned in that case.
pub fn probe(path: &str) -> Result<(Info, Vec<Warning>), ProbeError> {
    probe_at(Path::new(CGROUP_ROOT), path)
}

fn probe_at(cgroup_root: &Path, path: &str) -> Result<(Info, Vec<Warning>), ProbeError> {
    let path = if path.is_empty() { "/" } else { path };
    let group_dir = cgroup_root.join(path.trim_start_matches('/'));

    let controllers_path = group_dir.join(CONTROLLERS_FILE);
    let raw =
        std::fs::read_to_string(&controllers_path).map_err(|source| ProbeError::ControllerList {
            path: controllers_path,
            source,
        })?;
    let controllers: HashSet<&str> = raw.split_whitespace().collect();

    let mut info = Info::default();
    let mut warnings = Vec::new();

    if !controllers.contains(Controller::Memory.as_str()) {
        warnings.push(Warning::NoMemoryController);
    } else {
        info.memory_limit = true;
        info.swap_limit = swap_limit(cgroup_root, Path::new(PROC_SELF_CGROUP));
        info.memory_reservation = true;
    }

    if !controllers.contains(Controller::Cpu.as_str()) {
        warnings.push(Warning::NoCpuController);
    } else {
        info.cpu_shares = true;
        info.cpu_cfs = true;
    }

    if !controllers.contains(Controller::Io.as_str()) {
        warnings.push(Warning::NoIoController);
    } else {
        info.blkio_weight = true;
        info.blkio_weight_device = true;
        info.blkio_read_bps_device = true;
        info.blkio_write_bps_device = true;
        info.blkio_read_iops_device = true;
        info.blkio_write_iops_device = true;
    }

    if !controllers.contains(Controller::Cpuset.as_str()) {
        warnings.push(Warning::NoCpusetController);
    } else {
        info.cpuset = true;
        (info.cpus, info.mems) = effective_cpuset(&group_dir);
    }

    if !controllers.contains(Controller::Pids.as_str()) {
        warnings.push(Warning::NoPidsController);
    } else {
        info.pids_limit = true;
    }

    info.cgroup_devices_enabled = !running_in_user_ns(Path::new(PROC_SELF_UID_MAP));
    info.cgroup_namespaces = Path::new(CGROUP_NS_PATH).exists();

    Ok((info, warnings))
}

/// Unified-hierarchy cgroup path of the current process, read from its own
/// membership file. `None` when the process is not in a unified hierarchy.
pub fn self_unified_path() -> Option<String> {
    unified_cgroup_path(Path::new(PROC_SELF_CGROUP))
}

/// Returns true if the swap-max interface file exists under the unified
/// cgroup this process belongs to. Any resolution failure means false.
fn swap_limit(cgroup_root: &Path, proc_self_cgroup: &Path) -> bool {
    let Some(unified) = unified_cgroup_path(proc_self_cgroup) else {
        return false;
    };
    if unified.is_empty() {
        return false;
    }

    cgroup_root
        .join(unified.trim_start_matches('/'))
        .join(MEMORY_SWAP_MAX_FILE)
        .exists()
}

/// Extracts the unified-hierarchy relative path from a per-process cgroup
/// membership file. Unified entries have hierarchy id `0` and an empty
/// controller list: `0::/user.slice/session-1.scope`.
fn unified_cgroup_path(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;

    for line in contents.lines() {
        let mut fields = line.splitn(3, ':');
        let (Some(hierarchy), Some(controllers), Some(group_path)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };

        if hierarchy == "0" && controllers.is_empty() {
            return Some(group_path.to_owned());
        }
    }

    None
}

/// Reads the two effective-list files for the probed path. Failure to read
/// either degrades to empty strings.
fn effective_cpuset(group_dir: &Path) -> (String, String) {
    let cpus = fsutil::read_trimmed(group_dir.join(CPUSET_CPUS_EFFECTIVE_FILE));
    let mems = fsutil::read_trimmed(group_dir.join(CPUSET_MEMS_EFFECTIVE_FILE));

    match (cpus, mems) {
        (Some(cpus), Some(mems)) => (cpus, mems),
        _ => (String::new(), String::new()),
    }
}

/// Returns true if this process runs inside a user namespace. The initial
/// namespace maps the full range as `0 0 4294967295`.
fn running_in_user_ns(uid_map: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(uid_map) else {
        return false;
    };

    let Some(line) = contents.lines().next() else {
        return false;
    };

    let mut fields = line.split_whitespace();
    !matches!(
        (fields.next(), fields.next(), fields.next()),
        (Some("0"), Some("0"), Some("4294967295"))
    )
}
