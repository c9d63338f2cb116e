//! Error types for the scan model

use crate::scan::ScanNumber;

/// Errors raised while building or querying scan data
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A record does not match the number of columns
    #[error("record {index} has {actual} values, expected {expected}")]
    RecordWidth {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// Column lengths disagree
    #[error("column '{name}' has {actual} values, expected {expected}")]
    ColumnLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Requested column does not exist
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// Column name used twice
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    /// MCA counts do not fit the record count
    #[error("mca block of scan #{scan} has {actual} counts, expected {expected}")]
    McaShape {
        scan: ScanNumber,
        expected: usize,
        actual: usize,
    },

    /// Unknown scan status string
    #[error("unknown scan status '{0}'")]
    UnknownStatus(String),
}

/// Errors that can occur when working with fingerprints
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid digest length
    #[error("invalid fingerprint length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Failed to stat the fingerprinted file
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
