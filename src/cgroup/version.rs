//! Cgroup hierarchy generation and resource-manager policy discovery.
//!
//! Only the hierarchy generation (v1 vs. v2) is detected here; no
//! v1-controller-specific logic exists anywhere in this crate.

use std::path::Path;

pub(crate) const CGROUP_ROOT: &str = "/sys/fs/cgroup";
const CONTROLLERS_FILE: &str = "cgroup.controllers";
const SYSTEMD_RUNTIME_PATH: &str = "/run/systemd/system";

/// Generation of the cgroup hierarchy mounted on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SystemVersion {
    V1,
    V2,
}

/// Resource manager driving cgroup placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Manager {
    None,
    Systemd,
}

/// Cgroup namespace mode for spawned workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NsMode {
    Host,
    Private,
}

impl std::fmt::Display for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Manager::None => f.write_str("none"),
            Manager::Systemd => f.write_str("systemd"),
        }
    }
}

impl std::fmt::Display for NsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NsMode::Host => f.write_str("host"),
            NsMode::Private => f.write_str("private"),
        }
    }
}

/// Returns the hierarchy generation mounted at the standard cgroup root.
///
/// The unified hierarchy exposes `cgroup.controllers` at its root; a mount
/// without it is the legacy (v1) layout.
pub fn version() -> SystemVersion {
    version_at(Path::new(CGROUP_ROOT))
}

fn version_at(cgroup_root: &Path) -> SystemVersion {
    if cgroup_root.join(CONTROLLERS_FILE).is_file() {
        SystemVersion::V2
    } else {
        SystemVersion::V1
    }
}

/// Returns the default resource manager: `systemd` when systemd is running
/// and the hierarchy is v2, `none` otherwise.
pub fn default_manager() -> Manager {
    if version() == SystemVersion::V2 && is_systemd_available() {
        Manager::Systemd
    } else {
        Manager::None
    }
}

/// Returns the default cgroup namespace mode: `private` when systemd is
/// running and the hierarchy is v2, `host` otherwise.
pub fn default_ns_mode() -> NsMode {
    if version() == SystemVersion::V2 && is_systemd_available() {
        NsMode::Private
    } else {
        NsMode::Host
    }
}

/// Enumerates the resource managers usable on this host.
pub fn available_managers() -> Vec<Manager> {
    let mut candidates = vec![Manager::None];
    if version() == SystemVersion::V2 && is_systemd_available() {
        candidates.push(Manager::Systemd);
    }
    candidates
}

/// Enumerates the cgroup namespace modes usable on this host.
pub fn available_ns_modes() -> Vec<NsMode> {
    let mut candidates = vec![NsMode::Host];
    if version() == SystemVersion::V2 && is_systemd_available() {
        candidates.push(NsMode::Private);
    }
    candidates
}

/// Returns true if systemd is managing this host, inferred from its runtime
/// directory.
pub fn is_systemd_available() -> bool {
    is_systemd_available_at(Path::new(SYSTEMD_RUNTIME_PATH))
}

fn is_systemd_available_at(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_v2_with_controllers_file() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(CONTROLLERS_FILE), "cpu memory pids\n").unwrap();
        assert_eq!(version_at(root.path()), SystemVersion::V2);
    }

    #[test]
    fn test_version_v1_without_controllers_file() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(version_at(root.path()), SystemVersion::V1);
    }

    #[test]
    fn test_systemd_available_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_systemd_available_at(dir.path()));

        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(!is_systemd_available_at(file.path()));

        assert!(!is_systemd_available_at(Path::new(
            "/definitely/does/not/exist"
        )));
    }

    #[test]
    fn test_manager_display() {
        assert_eq!(Manager::None.to_string(), "none");
        assert_eq!(Manager::Systemd.to_string(), "systemd");
    }

    #[test]
    fn test_ns_mode_display() {
        assert_eq!(NsMode::Host.to_string(), "host");
        assert_eq!(NsMode::Private.to_string(), "private");
    }

    #[test]
    fn test_available_candidates_always_include_fallback() {
        assert!(available_managers().contains(&Manager::None));
        assert!(available_ns_modes().contains(&NsMode::Host));
    }
}
