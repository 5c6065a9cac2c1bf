//! sqlvault - compressed, checksummed database dumps and restores
//!
//! This library provides the orchestration core of the sqlvault backup
//! utility. A backup streams the dump tool's output through a compressor
//! straight into an archive file; a restore streams an archive through the
//! matching decompressor into the restore tool. Both sides run their two
//! external processes concurrently and fail if either one fails.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Option parsing, validation and the immutable `BackupConfig`
//! - `error`: Error types and the exit status taxonomy
//! - `pipeline`: External command specs and the concurrent stage runner
//! - `backup`: Backup/restore pipelines, archive naming and discovery
//! - `crypto`: SHA-256 checksum files and the zeroizing password type
//! - `cli`: Subcommand handlers for the `sqlvault` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlvault::config::BackupConfig;
//!
//! let config = BackupConfig::new("backup", "/backups");
//! let result = sqlvault::backup::run_backup(&config)?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod pipeline;

pub use error::{VaultError, VaultResult};
