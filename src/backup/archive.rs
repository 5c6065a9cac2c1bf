//! Archive identity
//!
//! An archive is named `<prefix>-<databases>-<UTC timestamp><ext>` and its
//! checksum lives next to it with `.sha256` appended.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{BackupConfig, Compression};
use crate::crypto::checksum_path;
use crate::error::{VaultError, VaultResult};

/// Logical identity of one backup artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveDescriptor {
    /// Full path of the archive
    pub path: PathBuf,
    /// Compression, always consistent with the path's extension
    pub compression: Compression,
    /// When the archive was created (name timestamp or modification time)
    pub created_at: DateTime<Utc>,
}

impl ArchiveDescriptor {
    /// Compute the archive file name for a backup taken at `timestamp`
    pub fn file_name_for(config: &BackupConfig, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}-{}-{}{}",
            config.prefix,
            config.databases.file_segment(),
            timestamp.format(&config.date_format),
            config.compression.extension()
        )
    }

    /// Descriptor for a new backup in the configured directory
    pub fn for_backup(config: &BackupConfig, timestamp: DateTime<Utc>) -> Self {
        Self {
            path: config
                .backup_dir
                .join(Self::file_name_for(config, timestamp)),
            compression: config.compression,
            created_at: timestamp,
        }
    }

    /// Descriptor for an existing archive on disk
    ///
    /// Fails with a configuration error when the extension is not one this
    /// tool knows how to decompress.
    pub fn from_path(path: &Path) -> VaultResult<Self> {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| VaultError::archive_not_found(path))?;

        let compression = Compression::from_file_name(&name).ok_or_else(|| {
            VaultError::Config(format!(
                "Unsupported archive extension: {} (expected .sql, .sql.gz, .sql.bz2 or .sql.zst)",
                name
            ))
        })?;

        let metadata = fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::archive_not_found(path)
            } else {
                VaultError::Io(format!("Failed to stat {}: {}", path.display(), e))
            }
        })?;

        let created_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            path: path.to_path_buf(),
            compression,
            created_at,
        })
    }

    /// Archive file name
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Extension derived from the compression
    pub fn extension(&self) -> &'static str {
        self.compression.extension()
    }

    /// Path of the associated checksum file
    pub fn checksum_path(&self) -> PathBuf {
        checksum_path(&self.path)
    }
}
