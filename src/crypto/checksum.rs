//! SHA-256 checksum files
//!
//! Archives are hashed in fixed-size chunks so a multi-gigabyte dump never
//! has to fit in memory. The checksum file uses the `sha256sum` text format
//! (`<hex>  <basename>`) so it can also be checked with standard tools.

use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{VaultError, VaultResult};

/// Suffix appended to an archive path to name its checksum file
pub const CHECKSUM_SUFFIX: &str = ".sha256";

const CHUNK_SIZE: usize = 64 * 1024;

/// Path of the checksum file belonging to `archive`
pub fn checksum_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(CHECKSUM_SUFFIX);
    PathBuf::from(name)
}

/// Compute the hex-encoded SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> VaultResult<String> {
    let file = File::open(path)
        .map_err(|e| VaultError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash `archive` and write `<archive>.sha256` next to it
///
/// Returns the checksum file path and the digest.
pub fn write_checksum_file(archive: &Path) -> VaultResult<(PathBuf, String)> {
    let digest = sha256_file(archive)?;
    let file_name = archive
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| VaultError::Io(format!("Not a file path: {}", archive.display())))?;

    let path = checksum_path(archive);
    let mut file = File::create(&path).map_err(|e| {
        VaultError::Io(format!("Failed to create checksum file {}: {}", path.display(), e))
    })?;
    writeln!(file, "{}  {}", digest, file_name)
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            VaultError::Io(format!("Failed to write checksum file {}: {}", path.display(), e))
        })?;

    Ok((path, digest))
}

/// A parsed checksum file line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    /// Lowercase hex digest
    pub digest: String,
    /// File name the digest was recorded for
    pub file_name: String,
}

impl ChecksumEntry {
    /// Parse a `sha256sum` line: `<hex>  <name>` or `<hex> *<name>`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (digest, rest) = line.split_once(char::is_whitespace)?;

        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let file_name = rest.trim_start_matches(' ').trim_start_matches('*');
        Some(Self {
            digest: digest.to_ascii_lowercase(),
            file_name: file_name.to_string(),
        })
    }
}

/// Read and parse the first line of a checksum file
pub fn read_checksum_file(path: &Path) -> VaultResult<ChecksumEntry> {
    let contents = fs::read_to_string(path).map_err(|e| {
        VaultError::Io(format!("Failed to read checksum file {}: {}", path.display(), e))
    })?;

    contents
        .lines()
        .next()
        .and_then(ChecksumEntry::parse)
        .ok_or_else(|| {
            VaultError::Integrity(format!("Malformed checksum file: {}", path.display()))
        })
}

/// Verify `archive` against the digest stored in `checksum_file`
pub fn verify_archive(archive: &Path, checksum_file: &Path) -> VaultResult<String> {
    let expected = read_checksum_file(checksum_file)?;
    let actual = sha256_file(archive)?;

    if let Some(name) = archive.file_name() {
        if name.to_string_lossy() != expected.file_name {
            debug!(
                recorded = %expected.file_name,
                archive = %archive.display(),
                "checksum file names a different file, comparing digest only"
            );
        }
    }

    if actual != expected.digest {
        return Err(VaultError::Integrity(format!(
            "Checksum mismatch for {}: expected {}, got {}",
            archive.display(),
            expected.digest,
            actual
        )));
    }

    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // sha256("hello\n")
    const HELLO_DIGEST: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn test_checksum_path_appends_suffix() {
        let path = checksum_path(Path::new("/backups/backup-all-databases-2025-01-01.sql.zst"));
        assert_eq!(
            path,
            PathBuf::from("/backups/backup-all-databases-2025-01-01.sql.zst.sha256")
        );
    }

    #[test]
    fn test_sha256_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.sql");
        fs::write(&path, b"hello\n").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), HELLO_DIGEST);
    }

    #[test]
    fn test_write_checksum_file_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.sql");
        fs::write(&path, b"hello\n").unwrap();

        let (sum_path, digest) = write_checksum_file(&path).unwrap();
        assert_eq!(digest, HELLO_DIGEST);

        let contents = fs::read_to_string(sum_path).unwrap();
        assert_eq!(contents, format!("{}  a.sql\n", HELLO_DIGEST));
    }

    #[test]
    fn test_parse_binary_marker() {
        let line = format!("{} *dump.sql.gz", HELLO_DIGEST.to_uppercase());
        let entry = ChecksumEntry::parse(&line).unwrap();
        assert_eq!(entry.digest, HELLO_DIGEST);
        assert_eq!(entry.file_name, "dump.sql.gz");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ChecksumEntry::parse("not-a-digest  file").is_none());
        assert!(ChecksumEntry::parse("").is_none());
    }

    #[test]
    fn test_verify_detects_bit_flip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.sql");
        fs::write(&path, b"hello\n").unwrap();
        let (sum_path, _) = write_checksum_file(&path).unwrap();

        assert!(verify_archive(&path, &sum_path).is_ok());

        let mut bytes = fs::read(&path).unwrap();
        bytes[0] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        let err = verify_archive(&path, &sum_path).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_malformed_checksum_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.sql");
        fs::write(&path, b"hello\n").unwrap();
        let sum_path = checksum_path(&path);
        fs::write(&sum_path, "garbage\n").unwrap();

        assert!(verify_archive(&path, &sum_path).unwrap_err().is_integrity());
    }
}
