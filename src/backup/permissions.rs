//! Best-effort ownership and permission changes
//!
//! Failures here are reported as [`BestEffortWarning`] values, logged by the
//! caller, and never turned into errors.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Ownership;

/// A post-write metadata change that did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BestEffortWarning {
    /// File the change was applied to
    pub path: PathBuf,
    /// Which change failed (`chown` or `chmod`)
    pub action: &'static str,
    /// Underlying error text
    pub message: String,
}

impl fmt::Display for BestEffortWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} failed: {}",
            self.action,
            self.path.display(),
            self.message
        )
    }
}

/// Apply ownership and mode to each path, collecting failures
pub fn apply_best_effort(
    paths: &[&Path],
    ownership: Ownership,
    mode: Option<u32>,
) -> Vec<BestEffortWarning> {
    let mut warnings = Vec::new();

    for path in paths {
        if ownership.is_set() {
            if let Err(message) = change_owner(path, ownership) {
                warnings.push(BestEffortWarning {
                    path: path.to_path_buf(),
                    action: "chown",
                    message,
                });
            }
        }

        if let Some(mode) = mode {
            if let Err(message) = change_mode(path, mode) {
                warnings.push(BestEffortWarning {
                    path: path.to_path_buf(),
                    action: "chmod",
                    message,
                });
            }
        }
    }

    warnings
}

#[cfg(unix)]
fn change_owner(path: &Path, ownership: Ownership) -> Result<(), String> {
    std::os::unix::fs::chown(path, ownership.uid, ownership.gid).map_err(|e| e.to_string())
}

#[cfg(not(unix))]
fn change_owner(_path: &Path, _ownership: Ownership) -> Result<(), String> {
    Err("ownership changes are not supported on this platform".to_string())
}

#[cfg(unix)]
fn change_mode(path: &Path, mode: u32) -> Result<(), String> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| e.to_string())
}

#[cfg(not(unix))]
fn change_mode(_path: &Path, _mode: u32) -> Result<(), String> {
    Err("permission modes are not supported on this platform".to_string())
}
