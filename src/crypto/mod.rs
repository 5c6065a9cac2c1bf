//! Integrity and credential handling for sqlvault
//!
//! Provides SHA-256 checksum files for archives and a zeroizing string type
//! for the database password.

pub mod checksum;
pub mod secure_memory;

pub use checksum::{checksum_path, sha256_file, verify_archive, write_checksum_file, ChecksumEntry};
pub use secure_memory::SecureString;
