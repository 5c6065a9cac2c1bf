//! Backup CLI commands
//!
//! Implements the backup, restore, list and verify subcommands.

use clap::Subcommand;
use std::path::PathBuf;

use crate::backup::{ArchiveInfo, BackupManager, RestoreManager};
use crate::config::BackupConfig;
use crate::error::VaultResult;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Dump, compress and checksum the configured databases
    Backup {
        /// Print the run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Restore an archive (newest in BACKUP_DIR when no path is given)
    Restore {
        /// Archive file, or directory to pick the newest archive from
        archive: Option<PathBuf>,

        /// Target database, created first if it does not exist
        database: Option<String>,
    },

    /// List archives, newest first
    List {
        /// Directory to list instead of BACKUP_DIR
        dir: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify an archive against its checksum file
    Verify {
        /// Archive file, or directory to pick the newest archive from
        archive: Option<PathBuf>,
    },
}

impl BackupCommands {
    /// Whether the command talks to the database server
    pub fn needs_server(&self) -> bool {
        matches!(self, Self::Backup { .. } | Self::Restore { .. })
    }
}

/// Handle a backup command
pub fn handle_backup_command(config: &BackupConfig, cmd: BackupCommands) -> VaultResult<()> {
    match cmd {
        BackupCommands::Backup { json } => {
            let result = BackupManager::new(config).run_backup()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            if let Some(archive) = &result.archive {
                println!("Backup created: {}", archive.file_name());
                println!("Location: {}", archive.path.display());
                println!("Size: {}", format_size(result.bytes_written.unwrap_or(0)));
                if let Some(checksum) = &result.checksum {
                    println!("SHA-256: {}", checksum);
                }
            }
            if !result.warnings.is_empty() {
                println!("Warnings:");
                for warning in &result.warnings {
                    println!("  {}", warning);
                }
            }
        }

        BackupCommands::Restore { archive, database } => {
            let result = RestoreManager::new(config)
                .run_restore(archive.as_deref(), database.as_deref())?;

            if let Some(archive) = &result.archive {
                println!("Restored: {}", archive.path.display());
            }
            if let Some(database) = database {
                println!("Database: {}", database);
            }
        }

        BackupCommands::List { dir, json } => {
            let locator = RestoreManager::new(config).locator();
            let archives = match &dir {
                Some(dir) => locator.list_in(dir)?,
                None => locator.list()?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&archives)?);
                return Ok(());
            }

            if archives.is_empty() {
                let dir = dir.unwrap_or_else(|| config.backup_dir.clone());
                println!("No archives found in {}.", dir.display());
                println!("Create one with: sqlvault backup");
                return Ok(());
            }

            print!("{}", format_archive_list(&archives));
            println!();
            println!("Total: {} archive(s)", archives.len());
        }

        BackupCommands::Verify { archive } => {
            let manager = RestoreManager::new(config);
            let archive = manager.resolve(archive.as_deref())?;
            let digest = manager.verify(&archive)?;

            println!("OK: {}", archive.path.display());
            println!("SHA-256: {}", digest);
        }
    }

    Ok(())
}

/// Format archives as an aligned table
fn format_archive_list(archives: &[ArchiveInfo]) -> String {
    let name_width = archives
        .iter()
        .map(|a| a.filename.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<name_width$}  {:>10}  {:>6}  {:<4}  {}\n",
        "Name",
        "Size",
        "Age",
        "Comp",
        "Checksum",
        name_width = name_width,
    ));
    output.push_str(&format!(
        "{:-<name_width$}  {:->10}  {:->6}  {:-<4}  {:-<8}\n",
        "",
        "",
        "",
        "",
        "",
        name_width = name_width,
    ));

    let now = chrono::Utc::now();
    for archive in archives {
        output.push_str(&format!(
            "{:<name_width$}  {:>10}  {:>6}  {:<4}  {}\n",
            archive.filename,
            format_size(archive.size_bytes),
            format_duration(now.signed_duration_since(archive.modified)),
            archive.compression.to_string(),
            if archive.has_checksum { "yes" } else { "no" },
            name_width = name_width,
        ));
    }

    output
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

/// Format a file size in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
