//! AppArmor capability checks.
//!
//! Checks are memoized per [`AppArmor`] instance rather than process-wide,
//! so independent instances (and tests) observe their own filesystem
//! state.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::fsutil;

const KERNEL_PATH: &str = "/sys/kernel/security/apparmor";
const ENABLED_PARAM_PATH: &str = "/sys/module/apparmor/parameters/enabled";

const PROFILES_LIST_FILE: &str = "profiles";
const POLICY_PROFILES_DIR: &str = "policy/profiles";

/// A currently loaded AppArmor profile.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Profile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Lazily memoized AppArmor capability checks.
///
/// Note that the securityfs paths may not be accessible from user
/// namespaces.
#[derive(Debug)]
pub struct AppArmor {
    kernel_path: PathBuf,
    enabled_param_path: PathBuf,
    supported: OnceLock<bool>,
    enabled: OnceLock<bool>,
}

impl Default for AppArmor {
    fn default() -> Self {
        Self::new()
    }
}

impl AppArmor {
    pub fn new() -> Self {
        Self::with_paths(Path::new(KERNEL_PATH), Path::new(ENABLED_PARAM_PATH))
    }

    fn with_paths(kernel_path: &Path, enabled_param_path: &Path) -> Self {
        Self {
            kernel_path: kernel_path.to_path_buf(),
            enabled_param_path: enabled_param_path.to_path_buf(),
            supported: OnceLock::new(),
            enabled: OnceLock::new(),
        }
    }

    /// Whether the kernel supports AppArmor. Memoized on first call.
    pub fn supported(&self) -> bool {
        *self.supported.get_or_init(|| self.kernel_path.exists())
    }

    /// Whether the AppArmor module parameter reports it enabled. Memoized
    /// on first call.
    pub fn enabled(&self) -> bool {
        *self.enabled.get_or_init(|| {
            fsutil::read_trimmed(&self.enabled_param_path).is_some_and(|v| v.starts_with('Y'))
        })
    }

    /// Whether the securityfs profile listing can be read. Root is not
    /// needed, but the listing is unreadable from user namespaces.
    pub fn profiles_accessible(&self) -> bool {
        std::fs::read(self.kernel_path.join(PROFILES_LIST_FILE)).is_ok()
    }

    /// Lists the currently loaded profiles from the policy directory.
    /// Entries whose name cannot be read are skipped; a missing mode
    /// degrades to `None`.
    ///
    /// # Errors
    ///
    /// Fails only when the policy directory itself cannot be listed.
    pub fn profiles(&self) -> io::Result<Vec<Profile>> {
        let profiles_dir = self.kernel_path.join(POLICY_PROFILES_DIR);
        let mut profiles = Vec::new();

        for entry in std::fs::read_dir(profiles_dir)? {
            let entry = entry?;

            let Some(name) = fsutil::read_trimmed(entry.path().join("name")) else {
                continue;
            };
            let mode = fsutil::read_trimmed(entry.path().join("mode"));

            profiles.push(Profile { name, mode });
        }

        Ok(profiles)
    }
}
