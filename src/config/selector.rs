//! Database selector
//!
//! Either every database on the server or an explicit, normalized list.

use serde::Serialize;
use std::fmt;

use crate::error::{VaultError, VaultResult};

/// Sentinel values meaning "all databases"
const ALL_SENTINELS: [&str; 2] = ["__ALL__", "ALL"];

/// Filename segment used for all-database dumps
pub const ALL_DATABASES_SEGMENT: &str = "all-databases";

/// Which databases a backup covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseSelector {
    /// Every database on the server
    All,
    /// A non-empty list of database names, in configured order, deduplicated
    Named(Vec<String>),
}

impl DatabaseSelector {
    /// Parse a selector from configuration
    ///
    /// Accepts the `__ALL__`/`ALL` sentinels or a comma and/or space
    /// separated list of names.
    pub fn parse(s: &str) -> VaultResult<Self> {
        let trimmed = s.trim();
        if ALL_SENTINELS.contains(&trimmed) {
            return Ok(Self::All);
        }

        let mut names: Vec<String> = Vec::new();
        for name in trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|n| !n.is_empty())
        {
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }

        if names.is_empty() {
            return Err(VaultError::Config(
                "Database selector is empty: set DB_DATABASES to __ALL__ or a list of names"
                    .into(),
            ));
        }

        Ok(Self::Named(names))
    }

    /// Whether this selector covers every database
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Canonical space-joined form, as passed to the dump tool
    pub fn canonical(&self) -> String {
        match self {
            Self::All => ALL_SENTINELS[0].to_string(),
            Self::Named(names) => names.join(" "),
        }
    }

    /// Segment used in archive file names (`all-databases` or `a+b`)
    pub fn file_segment(&self) -> String {
        match self {
            Self::All => ALL_DATABASES_SEGMENT.to_string(),
            Self::Named(names) => names.join("+"),
        }
    }

    /// Dump tool arguments selecting the databases
    pub fn dump_args(&self) -> Vec<String> {
        match self {
            Self::All => vec!["--all-databases".to_string()],
            Self::Named(names) => std::iter::once("--databases".to_string())
                .chain(names.iter().cloned())
                .collect(),
        }
    }
}

impl Default for DatabaseSelector {
    fn default() -> Self {
        Self::All
    }
}

impl fmt::Display for DatabaseSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all databases"),
            Self::Named(names) => write!(f, "{}", names.join(", ")),
        }
    }
}
