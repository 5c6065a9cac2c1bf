//! Two-process streaming pipelines
//!
//! Backup and restore share one shape: two external processes joined by a
//! byte stream (dump | compress, decompress | restore). This module owns the
//! process plumbing and the per-run outcome; the backup module owns what the
//! stages are and what to do with the result.

pub mod command;
pub mod runner;

use serde::Serialize;

pub use command::CommandSpec;
pub use runner::{deciding_failure, stage_error, Pipeline, StageStatus};

use crate::backup::{ArchiveDescriptor, BestEffortWarning};
use crate::error::VaultResult;

/// Outcome of one backup or restore run
///
/// Created from the stage statuses once every stage has terminated, then
/// enriched with the artifact details on the backup side.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// Status of every stage, in data-flow order
    pub stages: Vec<StageStatus>,
    /// Size of the written archive, when one was written
    pub bytes_written: Option<u64>,
    /// The archive produced or consumed
    pub archive: Option<ArchiveDescriptor>,
    /// Hex SHA-256 of the archive, when checksums are enabled
    pub checksum: Option<String>,
    /// Best-effort steps that did not succeed
    pub warnings: Vec<BestEffortWarning>,
}

impl PipelineResult {
    /// Wrap the statuses of a finished pipeline
    pub fn from_stages(stages: Vec<StageStatus>) -> Self {
        Self {
            stages,
            bytes_written: None,
            archive: None,
            checksum: None,
            warnings: Vec::new(),
        }
    }

    /// Whether every stage exited zero
    pub fn is_success(&self) -> bool {
        deciding_failure(&self.stages).is_none()
    }

    /// The stage whose status the whole pipeline reports
    pub fn failure(&self) -> Option<&StageStatus> {
        deciding_failure(&self.stages)
    }

    /// `Ok(self)` on success, otherwise the deciding stage as a `Stage` error
    pub fn into_result(self) -> VaultResult<Self> {
        match self.failure() {
            Some(failed) => Err(stage_error(failed, &self.stages)),
            None => Ok(self),
        }
    }
}
