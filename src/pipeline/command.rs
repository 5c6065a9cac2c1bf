//! External command descriptions
//!
//! A `CommandSpec` is the argument contract for one stage. It renders to a
//! log-safe string (program and arguments only) and to a `std::process::Command`
//! that additionally carries any secret environment for that one child.

use std::fmt;
use std::path::Path;
use std::process::Command;

use crate::config::settings::{PASSWORD_ENV, PASSWORD_SOURCE_ENV};
use crate::crypto::SecureString;

/// Credentials in the parent environment that no child inherits
const SCRUBBED_ENV: [&str; 2] = [PASSWORD_SOURCE_ENV, PASSWORD_ENV];

/// Program, arguments and per-process secret environment for one stage
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    secret_env: Vec<(String, SecureString)>,
}

impl CommandSpec {
    /// Create a spec for `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret_env: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Expose `value` to this process only, through environment variable `key`
    pub fn secret_env(mut self, key: impl Into<String>, value: SecureString) -> Self {
        self.secret_env.push((key.into(), value));
        self
    }

    /// The program as configured
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The argument vector
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Short stage name used to tag logs and diagnostics (program basename)
    pub fn stage_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.clone())
    }

    /// Build the process command
    ///
    /// Credentials inherited from this process are removed; only the secret
    /// environment attached to this spec reaches the child.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for key in SCRUBBED_ENV {
            cmd.env_remove(key);
        }
        for (key, value) in &self.secret_env {
            cmd.env(key, value.expose());
        }
        cmd
    }
}

// Renders program and arguments only; secret environment is never shown
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                write!(f, " '{}'", arg.replace('\'', "'\\''"))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}
