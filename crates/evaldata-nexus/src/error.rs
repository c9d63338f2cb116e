//! Error types for container access

use std::path::PathBuf;

/// Errors during container read/write
#[derive(Debug, thiserror::Error)]
pub enum NexusError {
    /// IO error on the container file
    #[error("io error on {path}: {source}")]
    Io {
        /// Container path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON document could not be encoded or decoded
    #[error("json container error in {path}: {source}")]
    Json {
        /// Container path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Structural problem in the container
    #[error("malformed container {path}: {message}")]
    Format {
        /// Container path
        path: PathBuf,
        /// What is wrong
        message: String,
    },

    /// Requested entry is not in the container
    #[error("entry '{entry}' not found in {path}")]
    MissingEntry {
        /// Container path
        path: PathBuf,
        /// Entry name
        entry: String,
    },

    /// Container format not compiled in
    #[error("container format '{0}' is not available in this build")]
    UnsupportedFormat(String),

    /// HDF5 library error
    #[cfg(feature = "hdf5")]
    #[error("hdf5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl NexusError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create format error for path
    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for container operations
pub type NexusResult<T> = Result<T, NexusError>;
