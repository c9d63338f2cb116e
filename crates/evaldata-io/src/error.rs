//! Error types for scan sources
//!
//! - [`ParseError`]: reading raw files
//! - [`ConfigError`]: loading and validating a [`SourceConfig`](crate::SourceConfig)
//! - [`SourceError`]: everything a [`Source`](crate::Source) operation can hit

use evaldata_nexus::NexusError;
use evaldata_scan::{HashError, ScanError, ScanNumber};
use std::path::{Path, PathBuf};

/// Errors while reading raw scan files
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// IO error during file read
    #[error("io error reading {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed header or data line
    #[error("syntax error in {path} at byte {offset}: {message}")]
    Syntax {
        /// File being read
        path: PathBuf,
        /// Byte offset of the offending line within the file
        offset: u64,
        /// What is wrong
        message: String,
    },

    /// No reader accepts the path
    #[error("no reader registered for path: '{}'", .0.display())]
    NoReaderForPath(PathBuf),

    /// File name pattern cannot be expanded
    #[error("invalid file pattern '{0}'")]
    InvalidPattern(String),

    /// NeXus container used as raw input failed
    #[error("container error: {0}")]
    Nexus(#[from] NexusError),
}

impl ParseError {
    /// Create syntax error for path
    pub fn syntax_error(path: impl Into<PathBuf>, offset: u64, message: impl Into<String>) -> Self {
        Self::Syntax {
            path: path.into(),
            offset,
            message: message.into(),
        }
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Convert a fingerprint error for path
    pub(crate) fn from_hash(path: &Path, err: HashError) -> Self {
        match err {
            HashError::Io(source) => Self::io_error(path, source),
            other => Self::syntax_error(path, 0, other.to_string()),
        }
    }
}

/// Errors while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("io error reading {path}: {source}")]
    Io {
        /// Config file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for a source
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Values are inconsistent
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create invalid-value error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Errors returned by [`Source`](crate::Source) operations
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Scan number not known to the source
    #[error("scan #{0} not found in scan dict")]
    ScanNotFound(ScanNumber),

    /// Scan exists but holds no data
    #[error("scan #{0} has no data")]
    NoData(ScanNumber),

    /// Raw file could not be read
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Cache file could not be read or written
    #[error("cache error: {0}")]
    Cache(#[from] NexusError),

    /// Configuration rejected
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Scan model rejected the data
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
}

/// Result type alias for source operations
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_not_found_display() {
        let err = SourceError::ScanNotFound(42);
        assert_eq!(err.to_string(), "scan #42 not found in scan dict");
    }

    #[test]
    fn no_reader_display() {
        let err = ParseError::NoReaderForPath(PathBuf::from("/data/run.bin"));
        assert_eq!(err.to_string(), "no reader registered for path: '/data/run.bin'");
    }

    #[test]
    fn syntax_error_display() {
        let err = ParseError::syntax_error("scans.spec", 120, "bad scan number");
        assert_eq!(
            err.to_string(),
            "syntax error in scans.spec at byte 120: bad scan number"
        );
    }

    #[test]
    fn error_conversions() {
        let err: SourceError = ParseError::InvalidPattern("{:x}".to_string()).into();
        assert!(matches!(err, SourceError::Parse(_)));

        let err: SourceError = ConfigError::invalid("empty file name").into();
        assert!(matches!(err, SourceError::Config(_)));

        let err: SourceError = NexusError::UnsupportedFormat("hdf5".to_string()).into();
        assert!(matches!(err, SourceError::Cache(_)));
    }
}
