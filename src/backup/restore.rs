//! Restore pipeline
//!
//! Locates an archive, verifies it, optionally creates the target database,
//! then runs `decompress < archive | restore`. The archive is never modified.

use std::fs::File;
use std::path::Path;
use std::process::Stdio;

use tracing::{error, info, warn};

use super::archive::ArchiveDescriptor;
use super::locator::ArchiveLocator;
use crate::config::BackupConfig;
use crate::crypto::verify_archive;
use crate::error::{VaultError, VaultResult};
use crate::pipeline::{Pipeline, PipelineResult};

/// Restores archives into the configured server
pub struct RestoreManager<'a> {
    config: &'a BackupConfig,
}

impl<'a> RestoreManager<'a> {
    /// Create a new RestoreManager
    pub fn new(config: &'a BackupConfig) -> Self {
        Self { config }
    }

    /// Locator over the configured backup directory and prefix
    pub fn locator(&self) -> ArchiveLocator {
        ArchiveLocator::new(&self.config.backup_dir, &self.config.prefix)
    }

    /// Resolve a restore target (file, directory or default) to an archive
    pub fn resolve(&self, target: Option<&Path>) -> VaultResult<ArchiveDescriptor> {
        let path = self.locator().locate(target)?;
        ArchiveDescriptor::from_path(&path)
    }

    /// Verify an archive against its checksum file without restoring it
    ///
    /// Returns the verified digest. A missing checksum file is `NotFound`.
    pub fn verify(&self, archive: &ArchiveDescriptor) -> VaultResult<String> {
        let checksum_file = archive.checksum_path();
        if !checksum_file.exists() {
            return Err(VaultError::checksum_not_found(&checksum_file));
        }
        let digest = verify_archive(&archive.path, &checksum_file)?;
        info!(archive = %archive.path.display(), checksum = %digest, "checksum verified");
        Ok(digest)
    }

    /// Decompressor (if any) followed by the restore tool
    pub fn pipeline(&self, archive: &ArchiveDescriptor, database: Option<&str>) -> Pipeline {
        let restore = self.config.restore_spec(database);
        match archive.compression.decompressor() {
            Some(decompressor) => Pipeline::new(decompressor).then(Some(restore)),
            None => Pipeline::new(restore),
        }
    }

    /// Restore `target` (or the newest archive) into the server
    ///
    /// When `database` is given it is created first if missing, and the SQL
    /// is applied with it selected.
    pub fn run_restore(
        &self,
        target: Option<&Path>,
        database: Option<&str>,
    ) -> VaultResult<PipelineResult> {
        let archive = self.resolve(target)?;
        info!(
            archive = %archive.path.display(),
            compression = %archive.compression,
            database = database.unwrap_or("-"),
            "starting restore"
        );

        let checksum = if self.config.checksum {
            if archive.checksum_path().exists() {
                Some(self.verify(&archive)?)
            } else {
                warn!(archive = %archive.path.display(), "no checksum file, skipping verification");
                None
            }
        } else {
            None
        };

        if let Some(database) = database {
            self.ensure_database(database)?;
        }

        let input = File::open(&archive.path).map_err(|e| {
            VaultError::Io(format!(
                "Failed to open archive {}: {}",
                archive.path.display(),
                e
            ))
        })?;

        let stages = self
            .pipeline(&archive, database)
            .run(Stdio::from(input), Stdio::null())?;

        let mut result = PipelineResult::from_stages(stages);

        if let Some(failed) = result.failure() {
            for stage in &result.stages {
                for line in stage.stderr.lines().filter(|l| !l.trim().is_empty()) {
                    error!(stage = %stage.stage, "{}", line);
                }
            }
            error!(stage = %failed.stage, code = failed.exit_code(), "restore failed");
            return result.into_result();
        }

        info!(archive = %archive.path.display(), "restore complete");
        result.checksum = checksum;
        result.archive = Some(archive);
        Ok(result)
    }

    /// Idempotently create `database` before streaming data into it
    fn ensure_database(&self, database: &str) -> VaultResult<()> {
        let stages = Pipeline::new(self.config.create_database_spec(database))
            .run(Stdio::null(), Stdio::null())?;

        let result = PipelineResult::from_stages(stages);
        if let Some(failed) = result.failure() {
            error!(database, code = failed.exit_code(), "failed to create target database");
        }
        result.into_result()?;

        info!(database, "target database ready");
        Ok(())
    }
}
