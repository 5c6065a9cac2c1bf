//! Custom error types for sqlvault
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions. Every variant maps to a process exit
//! status so automation can tell a bad configuration from a broken dump.

use std::path::Path;

use thiserror::Error;

/// Exit status for generic runtime failures
pub const EXIT_FAILURE: u8 = 1;

/// Exit status for configuration/usage errors (sysexits `EX_USAGE`)
pub const EXIT_USAGE: u8 = 64;

/// Exit status when there is nothing to restore (sysexits `EX_NOINPUT`)
pub const EXIT_NO_INPUT: u8 = 66;

/// Exit status when a stage program cannot be started
pub const EXIT_NOT_EXECUTABLE: u8 = 127;

/// The main error type for sqlvault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Invalid or missing setting, detected before any process is spawned
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// An explicitly named archive or checksum file does not exist
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Archive discovery found nothing matching the configured prefix
    #[error("No archive matching '{prefix}-*' found in {directory}")]
    NoCandidate { directory: String, prefix: String },

    /// A stage program could not be started
    #[error("Failed to start '{program}': {message}")]
    Spawn { program: String, message: String },

    /// A pipeline stage exited unsuccessfully
    #[error("Stage '{stage}' failed with exit code {code}{}", format_diagnostics(.diagnostics))]
    Stage {
        stage: String,
        code: i32,
        diagnostics: String,
    },

    /// Checksum mismatch or an archive that is empty after a successful dump
    #[error("Integrity error: {0}")]
    Integrity(String),
}

fn format_diagnostics(diagnostics: &str) -> String {
    if diagnostics.is_empty() {
        String::new()
    } else {
        format!("\n{}", diagnostics)
    }
}

impl VaultError {
    /// Create a "not found" error for an archive path
    pub fn archive_not_found(path: &Path) -> Self {
        Self::NotFound {
            entity_type: "Archive",
            identifier: path.display().to_string(),
        }
    }

    /// Create a "not found" error for a checksum file
    pub fn checksum_not_found(path: &Path) -> Self {
        Self::NotFound {
            entity_type: "Checksum file",
            identifier: path.display().to_string(),
        }
    }

    /// Check if this is a "not found" error (explicit path or no candidate)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NoCandidate { .. })
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is an integrity error
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }

    /// Process exit status for this error
    ///
    /// Stage failures propagate the stage's own status, truncated to the
    /// range a process can actually report.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => EXIT_USAGE,
            Self::NotFound { .. } | Self::NoCandidate { .. } => EXIT_NO_INPUT,
            Self::Spawn { .. } => EXIT_NOT_EXECUTABLE,
            Self::Stage { code, .. } => match u8::try_from(*code) {
                Ok(0) | Err(_) => EXIT_FAILURE,
                Ok(code) => code,
            },
            Self::Io(_) | Self::Integrity(_) => EXIT_FAILURE,
        }
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(format!("JSON output failed: {}", err))
    }
}

/// Result type alias for sqlvault operations
pub type VaultResult<T> = Result<T, VaultError>;
