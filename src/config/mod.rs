//! Configuration module for sqlvault
//!
//! This module provides configuration resolution including:
//! - Flag/environment option parsing
//! - Database selector and compression choice normalization
//! - Validation before any destructive action

pub mod compression;
pub mod selector;
pub mod settings;

pub use compression::Compression;
pub use selector::DatabaseSelector;
pub use settings::{BackupConfig, ConfigArgs, Ownership};
