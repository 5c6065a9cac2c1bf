//! Shared helpers for CLI tests
//!
//! Dump and restore tools are replaced by small shell scripts so the tests
//! exercise the real process plumbing without a database server.

#![allow(dead_code)]

use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};
use std::time::{Duration, SystemTime};

use assert_cmd::Command;
use tempfile::TempDir;

/// Scratch layout for one test: a backup dir plus fake tools
pub struct Sandbox {
    pub temp: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("backups")).unwrap();
        Self { temp }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.temp.path().join("backups")
    }

    /// File the fake restore tool appends its arguments and input to
    pub fn restore_log(&self) -> PathBuf {
        self.temp.path().join("restore.log")
    }

    /// Write an executable shell script and return its path
    pub fn tool(&self, name: &str, body: &str) -> String {
        let path = self.temp.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    /// A fake restore tool logging `args: ...` and its stdin
    pub fn logging_restore_tool(&self) -> String {
        let log = self.restore_log();
        self.tool(
            "fake-restore",
            &format!(
                "echo \"args: $*\" >> '{0}'\ncat >> '{0}'",
                log.display()
            ),
        )
    }

    /// Put an archive in the backup dir with a modification time `age_secs` ago
    pub fn archive(&self, name: &str, contents: &[u8], age_secs: u64) -> PathBuf {
        let path = self.backup_dir().join(name);
        fs::write(&path, contents).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        path
    }

    /// The binary with a clean environment pointing at this sandbox
    pub fn sqlvault(&self) -> Command {
        let mut cmd = Command::cargo_bin("sqlvault").unwrap();
        cmd.env_clear()
            .env("PATH", std::env::var("PATH").unwrap_or_default())
            .env("DB_USER", "backup")
            .env("BACKUP_DIR", self.backup_dir())
            .env("RUST_LOG", "info");
        cmd
    }

    /// Only file names in the backup dir, sorted
    pub fn backup_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.backup_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

/// Whether an external program can be run
pub fn tool_available(program: &str) -> bool {
    StdCommand::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Decompress `path` with `program -dc` and return the bytes
pub fn decompress(program: &str, path: &Path) -> Vec<u8> {
    let output = StdCommand::new(program)
        .arg("-dc")
        .stdin(File::open(path).unwrap())
        .output()
        .unwrap();
    assert!(output.status.success(), "{} -dc failed", program);
    output.stdout
}

/// Compress `data` with `program -c` into `path`
pub fn compress_into(program: &str, data: &[u8], path: &Path) {
    let input = path.with_extension("plain");
    fs::write(&input, data).unwrap();
    let status = StdCommand::new(program)
        .arg("-c")
        .stdin(File::open(&input).unwrap())
        .stdout(File::create(path).unwrap())
        .status()
        .unwrap();
    fs::remove_file(&input).unwrap();
    assert!(status.success(), "{} -c failed", program);
}
