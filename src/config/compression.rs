//! Compression choice
//!
//! Maps each supported compression to its archive extension and to the
//! external compressor/decompressor invocation.

use serde::Serialize;
use std::fmt;

use crate::pipeline::CommandSpec;

/// Supported archive compressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Compression {
    /// Plain SQL, no compressor stage
    #[serde(rename = "none")]
    None,
    /// gzip (`.sql.gz`)
    #[serde(rename = "gz")]
    Gzip,
    /// bzip2 (`.sql.bz2`)
    #[serde(rename = "bz2")]
    Bzip2,
    /// zstd (`.sql.zst`)
    #[serde(rename = "zst")]
    Zstd,
}

/// Highest zstd level accepted without `--ultra`
const ZSTD_MAX_REGULAR_LEVEL: i32 = 19;

impl Compression {
    /// Every compression, longest extension first so suffix matching is unambiguous
    pub const ALL: [Compression; 4] = [Self::Zstd, Self::Bzip2, Self::Gzip, Self::None];

    /// Parse a compression choice from configuration
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "zst" | "zstd" => Some(Self::Zstd),
            "gz" | "gzip" => Some(Self::Gzip),
            "bz2" | "bzip2" => Some(Self::Bzip2),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// Archive file extension, including the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => ".sql",
            Self::Gzip => ".sql.gz",
            Self::Bzip2 => ".sql.bz2",
            Self::Zstd => ".sql.zst",
        }
    }

    /// Detect the compression of an archive from its file name
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|compression| name.ends_with(compression.extension()))
    }

    /// Compressor stage reading SQL on stdin and writing to stdout
    ///
    /// Returns `None` for [`Compression::None`]: the dump is written straight
    /// to the archive. Levels and thread counts are handed to the tool as-is.
    pub fn compressor(&self, level: Option<i32>, threads: Option<u32>) -> Option<CommandSpec> {
        let spec = match self {
            Self::None => return None,
            Self::Gzip => CommandSpec::new("gzip").arg("-c"),
            Self::Bzip2 => CommandSpec::new("bzip2").arg("-c"),
            Self::Zstd => CommandSpec::new("zstd").arg("-q").arg("-c"),
        };

        let spec = match level {
            Some(level) => spec.arg(format!("-{}", level)),
            None => spec,
        };

        let spec = match (self, level) {
            (Self::Zstd, Some(level)) if level > ZSTD_MAX_REGULAR_LEVEL => spec.arg("--ultra"),
            _ => spec,
        };

        match (self, threads) {
            (Self::Zstd, Some(threads)) => Some(spec.arg(format!("-T{}", threads))),
            _ => Some(spec),
        }
    }

    /// Decompressor stage reading the archive on stdin and writing SQL to stdout
    pub fn decompressor(&self) -> Option<CommandSpec> {
        match self {
            Self::None => None,
            Self::Gzip => Some(CommandSpec::new("gzip").arg("-dc")),
            Self::Bzip2 => Some(CommandSpec::new("bzip2").arg("-dc")),
            Self::Zstd => Some(CommandSpec::new("zstd").arg("-q").arg("-dc")),
        }
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self::Zstd
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gzip => write!(f, "gz"),
            Self::Bzip2 => write!(f, "bz2"),
            Self::Zstd => write!(f, "zst"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choices() {
        assert_eq!(Compression::parse("zst"), Some(Compression::Zstd));
        assert_eq!(Compression::parse("ZSTD"), Some(Compression::Zstd));
        assert_eq!(Compression::parse("gz"), Some(Compression::Gzip));
        assert_eq!(Compression::parse("bzip2"), Some(Compression::Bzip2));
        assert_eq!(Compression::parse("none"), Some(Compression::None));
        assert_eq!(Compression::parse("xz"), None);
        assert_eq!(Compression::parse(""), None);
    }

    #[test]
    fn test_extensions() {
        assert_eq!(Compression::None.extension(), ".sql");
        assert_eq!(Compression::Gzip.extension(), ".sql.gz");
        assert_eq!(Compression::Bzip2.extension(), ".sql.bz2");
        assert_eq!(Compression::Zstd.extension(), ".sql.zst");
    }

    #[test]
    fn test_from_file_name() {
        assert_eq!(
            Compression::from_file_name("backup-a+b-2025-01-01.sql.gz"),
            Some(Compression::Gzip)
        );
        assert_eq!(
            Compression::from_file_name("backup-all-databases-2025-01-01.sql"),
            Some(Compression::None)
        );
        assert_eq!(Compression::from_file_name("backup.sql.zst.sha256"), None);
        assert_eq!(Compression::from_file_name("backup.tar.xz"), None);
    }

    #[test]
    fn test_compressor_arguments() {
        let gzip = Compression::Gzip.compressor(Some(9), Some(4)).unwrap();
        assert_eq!(gzip.to_string(), "gzip -c -9");

        let zstd = Compression::Zstd.compressor(Some(3), Some(4)).unwrap();
        assert_eq!(zstd.to_string(), "zstd -q -c -3 -T4");

        let ultra = Compression::Zstd.compressor(Some(22), None).unwrap();
        assert_eq!(ultra.to_string(), "zstd -q -c -22 --ultra");

        assert!(Compression::None.compressor(Some(3), None).is_none());
    }

    #[test]
    fn test_level_not_validated() {
        // Out-of-range levels are the compressor's to reject
        let gzip = Compression::Gzip.compressor(Some(42), None).unwrap();
        assert_eq!(gzip.to_string(), "gzip -c -42");
    }

    #[test]
    fn test_serialized_names_match_display() {
        for compression in Compression::ALL {
            let json = serde_json::to_string(&compression).unwrap();
            assert_eq!(json, format!("\"{}\"", compression));
        }
        assert_eq!(serde_json::to_string(&Compression::Gzip).unwrap(), "\"gz\"");
    }

    #[test]
    fn test_decompressor_arguments() {
        assert_eq!(
            Compression::Bzip2.decompressor().unwrap().to_string(),
            "bzip2 -dc"
        );
        assert!(Compression::None.decompressor().is_none());
    }
}
