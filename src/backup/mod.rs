//! Backup and restore pipelines for sqlvault
//!
//! # Architecture
//!
//! The backup system consists of two main components:
//!
//! - `BackupManager`: dump | compress > archive, then checksum and permissions
//! - `RestoreManager`: locate, verify, then decompress < archive | restore
//!
//! # Archive Format
//!
//! Archives are plain SQL dumps, optionally compressed, named
//! `<prefix>-<databases>-<UTC timestamp><ext>` with a `sha256sum`-style
//! checksum file alongside (`<archive>.sha256`).
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlvault::backup::{BackupManager, RestoreManager};
//! use sqlvault::config::BackupConfig;
//!
//! let config = BackupConfig::new("backup", "/backups");
//!
//! let result = BackupManager::new(&config).run_backup()?;
//! println!("{:?}", result.archive);
//!
//! // Later, restore the newest archive into `shop`
//! RestoreManager::new(&config).run_restore(None, Some("shop"))?;
//! ```

mod archive;
mod locator;
mod manager;
mod permissions;
mod restore;

pub use archive::ArchiveDescriptor;
pub use locator::{ArchiveInfo, ArchiveLocator};
pub use manager::BackupManager;
pub use permissions::{apply_best_effort, BestEffortWarning};
pub use restore::RestoreManager;

use std::path::Path;

use crate::config::BackupConfig;
use crate::error::VaultResult;
use crate::pipeline::PipelineResult;

/// Run one backup with `config`
pub fn run_backup(config: &BackupConfig) -> VaultResult<PipelineResult> {
    BackupManager::new(config).run_backup()
}

/// Restore `archive` (file, directory, or the configured directory when
/// `None`) into the server, optionally into `target_database`
pub fn run_restore(
    config: &BackupConfig,
    archive: Option<&Path>,
    target_database: Option<&str>,
) -> VaultResult<PipelineResult> {
    RestoreManager::new(config).run_restore(archive, target_database)
}
