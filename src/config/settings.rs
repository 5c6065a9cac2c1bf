//! Backup settings
//!
//! `ConfigArgs` is what the operator provides (flags or environment
//! variables); `BackupConfig` is the validated, immutable result that every
//! pipeline receives by reference. All validation happens in
//! [`ConfigArgs::resolve`], before any process is spawned.

use std::path::{PathBuf, MAIN_SEPARATOR};

use chrono::format::{Item, StrftimeItems};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args};
use serde::Serialize;

use super::compression::Compression;
use super::selector::DatabaseSelector;
use crate::crypto::SecureString;
use crate::error::{VaultError, VaultResult};
use crate::pipeline::CommandSpec;

/// Environment variable the dump/restore tools read the password from
pub const PASSWORD_ENV: &str = "MYSQL_PWD";

/// Environment variable the operator provides the password in
pub const PASSWORD_SOURCE_ENV: &str = "DB_PASSWORD";

/// Options shared by every subcommand, each settable by flag or environment
#[derive(Args, Clone)]
pub struct ConfigArgs {
    /// Database server host
    #[arg(long, env = "DB_HOST", default_value = "localhost", global = true)]
    pub host: String,

    /// Database server port
    #[arg(long, env = "DB_PORT", default_value_t = 3306, global = true)]
    pub port: u16,

    /// Database user (required to back up or restore)
    #[arg(long, env = "DB_USER", global = true)]
    pub user: Option<String>,

    /// Database password, read from DB_PASSWORD only (never a flag)
    #[arg(skip = password_from_env())]
    pub password: Option<String>,

    /// Databases to back up: __ALL__ or a comma/space separated list
    #[arg(long, env = "DB_DATABASES", default_value = "__ALL__", global = true)]
    pub databases: String,

    /// Directory archives are written to and discovered in
    #[arg(long, env = "BACKUP_DIR", default_value = "/backups", global = true)]
    pub backup_dir: PathBuf,

    /// Archive filename prefix
    #[arg(long, env = "BACKUP_PREFIX", default_value = "backup", global = true)]
    pub prefix: String,

    /// UTC timestamp format (strftime) used in archive names
    #[arg(long, env = "BACKUP_DATE_FORMAT", default_value = "%Y-%m-%d", global = true)]
    pub date_format: String,

    /// Compression: zst, gz, bz2 or none
    #[arg(long, env = "COMPRESSION", default_value = "zst", global = true)]
    pub compression: String,

    /// Compression level, passed to the compressor unchecked
    #[arg(long, env = "COMPRESSION_LEVEL", global = true)]
    pub compression_level: Option<i32>,

    /// Compressor thread hint (zstd only)
    #[arg(long, env = "COMPRESSION_THREADS", global = true)]
    pub compression_threads: Option<u32>,

    /// Write a .sha256 file after backup and verify it before restore
    #[arg(
        long,
        env = "CHECKSUM",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub checksum: bool,

    /// Owner uid applied to archives (best effort)
    #[arg(long, env = "BACKUP_UID", global = true)]
    pub uid: Option<u32>,

    /// Owner gid applied to archives (best effort)
    #[arg(long, env = "BACKUP_GID", global = true)]
    pub gid: Option<u32>,

    /// Octal permission mode applied to archives (best effort), e.g. 0640
    #[arg(long, env = "BACKUP_MODE", global = true)]
    pub mode: Option<String>,

    /// Dump tool program
    #[arg(long, env = "DUMP_COMMAND", default_value = "mysqldump", global = true)]
    pub dump_command: String,

    /// Restore tool program
    #[arg(long, env = "RESTORE_COMMAND", default_value = "mysql", global = true)]
    pub restore_command: String,

    /// Extra dump tool options, whitespace separated
    #[arg(
        long,
        env = "DUMP_OPTIONS",
        default_value = "--single-transaction --routines --triggers --events",
        allow_hyphen_values = true,
        global = true
    )]
    pub dump_options: String,
}

impl ConfigArgs {
    /// Validate everything and build the immutable configuration
    pub fn resolve(self) -> VaultResult<BackupConfig> {
        self.build(true)
    }

    /// Like [`resolve`](Self::resolve) for commands that never contact the
    /// server; the user may be left unset (empty)
    pub fn resolve_local(self) -> VaultResult<BackupConfig> {
        self.build(false)
    }

    fn build(self, user_required: bool) -> VaultResult<BackupConfig> {
        let user = self
            .user
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let user = match user {
            Some(user) => user,
            None if user_required => {
                return Err(VaultError::Config("DB_USER is required".into()))
            }
            None => String::new(),
        };

        let compression = Compression::parse(&self.compression).ok_or_else(|| {
            VaultError::Config(format!(
                "Invalid compression: '{}'. Valid choices: zst, gz, bz2, none",
                self.compression
            ))
        })?;

        let databases = DatabaseSelector::parse(&self.databases)?;
        validate_prefix(&self.prefix)?;
        validate_date_format(&self.date_format)?;
        let mode = self.mode.as_deref().map(parse_mode).transpose()?;

        Ok(BackupConfig {
            host: self.host,
            port: self.port,
            user,
            password: self.password.map(SecureString::from),
            databases,
            backup_dir: self.backup_dir,
            prefix: self.prefix,
            date_format: self.date_format,
            compression,
            compression_level: self.compression_level,
            compression_threads: self.compression_threads,
            checksum: self.checksum,
            ownership: Ownership {
                uid: self.uid,
                gid: self.gid,
            },
            mode,
            dump_command: self.dump_command,
            restore_command: self.restore_command,
            dump_options: self
                .dump_options
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        })
    }
}

/// Optional owner applied to written archives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Ownership {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Ownership {
    /// Whether any ownership change is configured
    pub fn is_set(&self) -> bool {
        self.uid.is_some() || self.gid.is_some()
    }
}

/// Resolved, validated settings for one run
#[derive(Debug, Clone, Serialize)]
pub struct BackupConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip)]
    pub password: Option<SecureString>,
    pub databases: DatabaseSelector,
    pub backup_dir: PathBuf,
    pub prefix: String,
    pub date_format: String,
    pub compression: Compression,
    pub compression_level: Option<i32>,
    pub compression_threads: Option<u32>,
    pub checksum: bool,
    pub ownership: Ownership,
    pub mode: Option<u32>,
    pub dump_command: String,
    pub restore_command: String,
    pub dump_options: Vec<String>,
}

impl BackupConfig {
    /// Configuration with defaults for everything but the user and directory
    pub fn new(user: impl Into<String>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: user.into(),
            password: None,
            databases: DatabaseSelector::All,
            backup_dir: backup_dir.into(),
            prefix: "backup".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            compression: Compression::default(),
            compression_level: None,
            compression_threads: None,
            checksum: true,
            ownership: Ownership::default(),
            mode: None,
            dump_command: "mysqldump".to_string(),
            restore_command: "mysql".to_string(),
            dump_options: Vec::new(),
        }
    }

    fn connection_args(&self) -> Vec<String> {
        vec![
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
            "--user".to_string(),
            self.user.clone(),
        ]
    }

    fn with_credentials(&self, spec: CommandSpec) -> CommandSpec {
        match &self.password {
            Some(password) => spec.secret_env(PASSWORD_ENV, password.clone()),
            None => spec,
        }
    }

    /// Dump stage: writes the selected databases as SQL to stdout
    pub fn dump_spec(&self) -> CommandSpec {
        let spec = CommandSpec::new(&self.dump_command)
            .args(self.connection_args())
            .args(self.dump_options.iter().cloned())
            .args(self.databases.dump_args());
        self.with_credentials(spec)
    }

    /// Restore stage: applies SQL from stdin, optionally into `database`
    pub fn restore_spec(&self, database: Option<&str>) -> CommandSpec {
        let spec = CommandSpec::new(&self.restore_command)
            .args(self.connection_args())
            .args(database);
        self.with_credentials(spec)
    }

    /// One-shot statement creating `database` if it does not exist
    pub fn create_database_spec(&self, database: &str) -> CommandSpec {
        let statement = format!(
            "CREATE DATABASE IF NOT EXISTS `{}`",
            database.replace('`', "``")
        );
        let spec = CommandSpec::new(&self.restore_command)
            .args(self.connection_args())
            .arg("--execute")
            .arg(statement);
        self.with_credentials(spec)
    }
}

fn password_from_env() -> Option<String> {
    std::env::var(PASSWORD_SOURCE_ENV)
        .ok()
        .filter(|p| !p.is_empty())
}

fn validate_prefix(prefix: &str) -> VaultResult<()> {
    if prefix.is_empty() || prefix.contains(['/', MAIN_SEPARATOR]) {
        return Err(VaultError::Config(format!(
            "Invalid filename prefix: '{}'",
            prefix
        )));
    }
    Ok(())
}

fn validate_date_format(format: &str) -> VaultResult<()> {
    if format.contains(['/', MAIN_SEPARATOR]) {
        return Err(VaultError::Config(format!(
            "Date format must not contain a path separator: '{}'",
            format
        )));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(VaultError::Config(format!(
            "Invalid date format: '{}'",
            format
        )));
    }
    Ok(())
}

fn parse_mode(mode: &str) -> VaultResult<u32> {
    let digits = mode.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|m| *m <= 0o7777)
        .ok_or_else(|| {
            VaultError::Config(format!(
                "Invalid permission mode: '{}' (expected octal, e.g. 0640)",
                mode
            ))
        })
}
