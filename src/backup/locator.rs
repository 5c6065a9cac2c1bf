//! Archive discovery for restore
//!
//! Resolves a restore target (explicit file, directory, or nothing) to one
//! archive. Discovery is a plain directory listing: files named
//! `<prefix>-*` with a supported extension, newest modification time first.
//! Equal modification times are ordered by file name, greatest first, so the
//! choice never depends on directory listing order.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::Compression;
use crate::crypto::checksum_path;
use crate::error::{VaultError, VaultResult};

/// Metadata about an archive found on disk
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    /// Archive filename
    pub filename: String,
    /// Full path to the archive
    pub path: PathBuf,
    /// Last modification time
    pub modified: DateTime<Utc>,
    /// Size in bytes
    pub size_bytes: u64,
    /// Compression detected from the extension
    pub compression: Compression,
    /// Whether a `.sha256` file sits next to the archive
    pub has_checksum: bool,
}

/// Finds archives by prefix in a directory
pub struct ArchiveLocator {
    /// Directory searched when no explicit target is given
    default_dir: PathBuf,
    /// Filename prefix archives must carry
    prefix: String,
}

impl ArchiveLocator {
    /// Create a new ArchiveLocator
    pub fn new(default_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            default_dir: default_dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Resolve a restore target to a single archive path
    ///
    /// - an existing file is used as-is
    /// - a directory (or `None`, meaning the default directory) yields its
    ///   newest matching archive, or `NoCandidate`
    /// - anything else is `NotFound`
    pub fn locate(&self, target: Option<&Path>) -> VaultResult<PathBuf> {
        let dir = match target {
            Some(path) if path.is_file() => return Ok(path.to_path_buf()),
            Some(path) if path.is_dir() => path,
            Some(path) => return Err(VaultError::archive_not_found(path)),
            None => self.default_dir.as_path(),
        };

        self.newest_in(dir)?
            .map(|info| info.path)
            .ok_or_else(|| VaultError::NoCandidate {
                directory: dir.display().to_string(),
                prefix: self.prefix.clone(),
            })
    }

    /// Newest matching archive in `dir`, if any
    pub fn newest_in(&self, dir: &Path) -> VaultResult<Option<ArchiveInfo>> {
        Ok(self.list_in(dir)?.into_iter().next())
    }

    /// All matching archives in the default directory, newest first
    pub fn list(&self) -> VaultResult<Vec<ArchiveInfo>> {
        self.list_in(&self.default_dir)
    }

    /// All matching archives in `dir`, newest first
    ///
    /// A missing directory simply has no archives.
    pub fn list_in(&self, dir: &Path) -> VaultResult<Vec<ArchiveInfo>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut archives = Vec::new();

        for entry in fs::read_dir(dir).map_err(|e| {
            VaultError::Io(format!("Failed to read directory {}: {}", dir.display(), e))
        })? {
            let entry = entry.map_err(|e| {
                VaultError::Io(format!("Failed to read directory entry: {}", e))
            })?;

            if let Some(info) = self.parse_archive_info(&entry.path()) {
                archives.push(info);
            }
        }

        archives.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.filename.cmp(&a.filename))
        });

        debug!(dir = %dir.display(), count = archives.len(), "archives discovered");
        Ok(archives)
    }

    /// Build archive info for a matching file, `None` for anything else
    fn parse_archive_info(&self, path: &Path) -> Option<ArchiveInfo> {
        let filename = path.file_name()?.to_string_lossy().to_string();

        let rest = filename.strip_prefix(&self.prefix)?;
        if !rest.starts_with('-') {
            return None;
        }
        let compression = Compression::from_file_name(&filename)?;

        let metadata = fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        let modified = DateTime::<Utc>::from(metadata.modified().ok()?);

        Some(ArchiveInfo {
            has_checksum: checksum_path(path).exists(),
            filename,
            path: path.to_path_buf(),
            modified,
            size_bytes: metadata.len(),
            compression,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"-- dump\n").unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        path
    }

    #[test]
    fn test_locate_newest() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "backup-all-databases-2025-01-01.sql.gz", 300);
        let newest = touch(temp.path(), "backup-all-databases-2025-01-03.sql.zst", 10);
        touch(temp.path(), "backup-all-databases-2025-01-02.sql", 100);

        let locator = ArchiveLocator::new(temp.path(), "backup");
        assert_eq!(locator.locate(None).unwrap(), newest);
    }

    #[test]
    fn test_locate_ignores_other_files() {
        let temp = TempDir::new().unwrap();
        let archive = touch(temp.path(), "backup-shop-2025-01-01.sql.gz", 100);
        touch(temp.path(), "backup-shop-2025-01-01.sql.gz.sha256", 1);
        touch(temp.path(), "other-shop-2025-01-02.sql.gz", 1);
        touch(temp.path(), "backupx-shop-2025-01-02.sql.gz", 1);
        touch(temp.path(), "backup-shop-2025-01-02.tar", 1);
        fs::create_dir(temp.path().join("backup-dir.sql")).unwrap();

        let locator = ArchiveLocator::new(temp.path(), "backup");
        assert_eq!(locator.locate(None).unwrap(), archive);

        let listed = locator.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].has_checksum);
    }

    #[test]
    fn test_tie_break_by_name() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "backup-a-2025.sql", 50);
        let b = touch(temp.path(), "backup-b-2025.sql", 50);
        let mtime = fs::metadata(&a).unwrap().modified().unwrap();
        File::options()
            .write(true)
            .open(&b)
            .unwrap()
            .set_modified(mtime)
            .unwrap();

        let locator = ArchiveLocator::new(temp.path(), "backup");
        assert_eq!(locator.locate(None).unwrap(), b);
    }

    #[test]
    fn test_no_candidate() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "unrelated.txt", 1);

        let locator = ArchiveLocator::new(temp.path(), "backup");
        let err = locator.locate(None).unwrap_err();
        assert!(matches!(err, VaultError::NoCandidate { .. }));
        assert_eq!(err.exit_code(), crate::error::EXIT_NO_INPUT);
    }

    #[test]
    fn test_missing_default_dir_is_no_candidate() {
        let temp = TempDir::new().unwrap();
        let locator = ArchiveLocator::new(temp.path().join("missing"), "backup");
        assert!(matches!(
            locator.locate(None).unwrap_err(),
            VaultError::NoCandidate { .. }
        ));
    }

    #[test]
    fn test_explicit_file_used_directly() {
        let temp = TempDir::new().unwrap();
        let path = touch(temp.path(), "renamed.sql.gz", 1);

        let locator = ArchiveLocator::new("/nonexistent", "backup");
        assert_eq!(locator.locate(Some(&path)).unwrap(), path);
    }

    #[test]
    fn test_explicit_missing_file_not_found() {
        let temp = TempDir::new().unwrap();
        let locator = ArchiveLocator::new(temp.path(), "backup");
        let err = locator
            .locate(Some(&temp.path().join("nope.sql.gz")))
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound { .. }));
    }

    #[test]
    fn test_explicit_directory_searched() {
        let temp = TempDir::new().unwrap();
        let sub = temp.path().join("older");
        fs::create_dir(&sub).unwrap();
        let archive = touch(&sub, "backup-all-databases-2024-12-31.sql", 1);

        let locator = ArchiveLocator::new(temp.path(), "backup");
        assert_eq!(locator.locate(Some(&sub)).unwrap(), archive);
    }
}
