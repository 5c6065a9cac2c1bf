//! Backup pipeline
//!
//! Runs `dump | compress > archive`, then checksums the archive and applies
//! best-effort ownership/permissions. A failed or empty run never leaves a
//! non-empty partial archive behind.

use std::fs::{self, File};
use std::path::Path;
use std::process::Stdio;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::archive::ArchiveDescriptor;
use super::permissions::apply_best_effort;
use crate::config::BackupConfig;
use crate::crypto::write_checksum_file;
use crate::error::{VaultError, VaultResult};
use crate::pipeline::{stage_error, Pipeline, PipelineResult};

/// Creates archives according to a resolved configuration
pub struct BackupManager<'a> {
    config: &'a BackupConfig,
}

impl<'a> BackupManager<'a> {
    /// Create a new BackupManager
    pub fn new(config: &'a BackupConfig) -> Self {
        Self { config }
    }

    /// The dump stage followed by the compressor (if any)
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.config.dump_spec()).then(
            self.config
                .compression
                .compressor(self.config.compression_level, self.config.compression_threads),
        )
    }

    /// Run a backup stamped with the current UTC time
    pub fn run_backup(&self) -> VaultResult<PipelineResult> {
        self.run_backup_at(Utc::now())
    }

    /// Run a backup whose archive name is computed from `timestamp`
    ///
    /// An archive of the same name from an earlier run is overwritten.
    pub fn run_backup_at(&self, timestamp: DateTime<Utc>) -> VaultResult<PipelineResult> {
        let config = self.config;

        fs::create_dir_all(&config.backup_dir).map_err(|e| {
            VaultError::Io(format!(
                "Failed to create backup directory {}: {}",
                config.backup_dir.display(),
                e
            ))
        })?;

        let archive = ArchiveDescriptor::for_backup(config, timestamp);
        info!(
            archive = %archive.path.display(),
            databases = %config.databases,
            compression = %config.compression,
            "starting backup"
        );

        // A checksum left over from an overwritten archive would no longer match
        let stale_checksum = archive.checksum_path();
        if stale_checksum.exists() {
            fs::remove_file(&stale_checksum).map_err(|e| {
                VaultError::Io(format!(
                    "Failed to remove stale checksum {}: {}",
                    stale_checksum.display(),
                    e
                ))
            })?;
        }

        let output = File::create(&archive.path).map_err(|e| {
            VaultError::Io(format!(
                "Failed to create archive {}: {}",
                archive.path.display(),
                e
            ))
        })?;

        let stages = match self.pipeline().run(Stdio::null(), Stdio::from(output)) {
            Ok(stages) => stages,
            Err(e) => {
                discard_partial(&archive.path);
                return Err(e);
            }
        };

        let mut result = PipelineResult::from_stages(stages);
        result.bytes_written = fs::metadata(&archive.path).ok().map(|m| m.len());

        if let Some(failed) = result.failure() {
            error!(
                stage = %failed.stage,
                code = failed.exit_code(),
                archive = %archive.path.display(),
                "backup failed"
            );
            let err = stage_error(failed, &result.stages);
            discard_partial(&archive.path);
            return Err(err);
        }

        for stage in &result.stages {
            for line in stage.diagnostics().lines() {
                warn!(stage = %stage.stage, "{}", line);
            }
        }

        // With a compressor the archive holds at least a frame header, so
        // emptiness is judged on what the dump stage itself emitted
        let dump_bytes = result
            .stages
            .first()
            .and_then(|dump| dump.bytes_out)
            .or(result.bytes_written)
            .unwrap_or(0);
        if dump_bytes == 0 {
            error!(archive = %archive.path.display(), "dump produced no output");
            discard_partial(&archive.path);
            return Err(VaultError::Integrity(format!(
                "Dump produced an empty archive: {}",
                archive.path.display()
            )));
        }

        let mut written = vec![archive.path.clone()];
        if config.checksum {
            let (checksum_file, digest) = write_checksum_file(&archive.path)?;
            info!(checksum = %digest, file = %checksum_file.display(), "checksum written");
            written.push(checksum_file);
            result.checksum = Some(digest);
        }

        let paths: Vec<&Path> = written.iter().map(|p| p.as_path()).collect();
        result.warnings = apply_best_effort(&paths, config.ownership, config.mode);
        for warning in &result.warnings {
            warn!(path = %warning.path.display(), action = warning.action, "{}", warning.message);
        }

        info!(
            archive = %archive.path.display(),
            dump_bytes,
            archive_bytes = result.bytes_written.unwrap_or(0),
            "backup complete"
        );
        result.archive = Some(archive);
        Ok(result)
    }
}

/// Remove a partial archive; failure to remove is only logged
fn discard_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!(archive = %path.display(), "removed partial archive"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(archive = %path.display(), error = %e, "failed to remove partial archive"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Compression;
    use crate::crypto::verify_archive;
    use chrono::TimeZone;
    use std::os::unix::fs::PermissionsExt;
    use std::process::Command;
    use tempfile::TempDir;

    /// Write an executable shell script standing in for the dump tool
    fn fake_tool(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn test_config(temp: &TempDir, dump_body: &str) -> BackupConfig {
        let mut config = BackupConfig::new("root", temp.path().join("backups"));
        config.compression = Compression::None;
        config.dump_command = fake_tool(temp.path(), "fake-dump", dump_body);
        config
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 2, 0, 0).unwrap()
    }

    #[test]
    fn test_uncompressed_backup_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp, "printf 'CREATE TABLE t (id INT);\\n'");

        let result = BackupManager::new(&config).run_backup_at(timestamp()).unwrap();
        let archive = result.archive.clone().unwrap();

        assert!(result.is_success());
        assert_eq!(
            archive.file_name(),
            "backup-all-databases-2025-03-01.sql"
        );
        assert_eq!(
            fs::read(&archive.path).unwrap(),
            b"CREATE TABLE t (id INT);\n"
        );
        assert_eq!(result.bytes_written, Some(25));
        assert!(verify_archive(&archive.path, &archive.checksum_path()).is_ok());
    }

    #[test]
    fn test_dump_failure_leaves_no_archive() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp, "printf 'partial output'; exit 3");

        let err = BackupManager::new(&config)
            .run_backup_at(timestamp())
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);

        let archive = ArchiveDescriptor::for_backup(&config, timestamp());
        assert!(!archive.path.exists());
        assert!(!archive.checksum_path().exists());
    }

    #[test]
    fn test_empty_dump_is_integrity_failure() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp, "exit 0");

        let err = BackupManager::new(&config)
            .run_backup_at(timestamp())
            .unwrap_err();
        assert!(err.is_integrity());
        assert!(!ArchiveDescriptor::for_backup(&config, timestamp()).path.exists());
    }

    #[test]
    fn test_empty_dump_behind_compressor_is_integrity_failure() {
        if Command::new("gzip").arg("--version").output().is_err() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let mut config = test_config(&temp, "exit 0");
        config.compression = Compression::Gzip;

        let err = BackupManager::new(&config)
            .run_backup_at(timestamp())
            .unwrap_err();
        assert!(err.is_integrity());

        let archive = ArchiveDescriptor::for_backup(&config, timestamp());
        assert!(!archive.path.exists());
        assert!(!archive.checksum_path().exists());
    }

    #[test]
    fn test_missing_dump_tool() {
        let temp = TempDir::new().unwrap();
        let mut config = test_config(&temp, "exit 0");
        config.dump_command = temp.path().join("no-such-dump").display().to_string();

        let err = BackupManager::new(&config)
            .run_backup_at(timestamp())
            .unwrap_err();
        assert!(matches!(err, VaultError::Spawn { .. }));
        assert!(!ArchiveDescriptor::for_backup(&config, timestamp()).path.exists());
    }

    #[test]
    fn test_checksum_disabled() {
        let temp = TempDir::new().unwrap();
        let mut config = test_config(&temp, "echo 'SELECT 1;'");
        config.checksum = false;

        let result = BackupManager::new(&config).run_backup_at(timestamp()).unwrap();
        let archive = result.archive.unwrap();
        assert!(result.checksum.is_none());
        assert!(!archive.checksum_path().exists());
    }

    #[test]
    fn test_same_day_run_overwrites() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp, "echo \"run $$\"");
        let manager = BackupManager::new(&config);

        let first = manager.run_backup_at(timestamp()).unwrap().archive.unwrap();
        let first_bytes = fs::read(&first.path).unwrap();
        let second = manager.run_backup_at(timestamp()).unwrap().archive.unwrap();

        assert_eq!(first.path, second.path);
        assert_ne!(fs::read(&second.path).unwrap(), first_bytes);
        assert!(verify_archive(&second.path, &second.checksum_path()).is_ok());
    }

    #[test]
    fn test_ownership_failure_does_not_fail_backup() {
        let temp = TempDir::new().unwrap();
        let mut config = test_config(&temp, "echo 'SELECT 1;'");
        // unprivileged runs get a chown warning, root runs simply succeed
        config.ownership.uid = Some(u32::MAX - 1);
        config.mode = Some(0o640);

        let result = BackupManager::new(&config).run_backup_at(timestamp()).unwrap();
        assert!(result.is_success());
        assert!(result.archive.unwrap().path.exists());
    }

    #[test]
    fn test_password_reaches_dump_tool_only_via_env() {
        let temp = TempDir::new().unwrap();
        let mut config = test_config(&temp, "echo \"pwd=$MYSQL_PWD args=$*\"");
        config.password = Some("hunter2".into());

        let result = BackupManager::new(&config).run_backup_at(timestamp()).unwrap();
        let contents = fs::read_to_string(result.archive.unwrap().path).unwrap();
        assert_eq!(
            contents,
            "pwd=hunter2 args=--host localhost --port 3306 --user root --all-databases\n"
        );
    }
}
