//! Scan metadata and the scan container

use crate::data::ScanData;
use crate::error::ScanError;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

/// Scan number as written in the raw file header
pub type ScanNumber = u32;

/// Acquisition status of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScanStatus {
    /// Header and data complete
    #[default]
    #[serde(rename = "OK")]
    Ok,
    /// Header only, no data block available
    #[serde(rename = "NODATA")]
    NoData,
    /// Scan was aborted while recording
    #[serde(rename = "ABORTED")]
    Aborted,
    /// Data block could not be interpreted
    #[serde(rename = "CORRUPTED")]
    Corrupted,
}

impl ScanStatus {
    /// Canonical string form
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoData => "NODATA",
            Self::Aborted => "ABORTED",
            Self::Corrupted => "CORRUPTED",
        }
    }

    /// Whether a data block may be read for this status
    #[must_use]
    pub const fn may_have_data(&self) -> bool {
        matches!(self, Self::Ok | Self::Aborted)
    }
}

impl Display for ScanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Self::Ok),
            "NODATA" => Ok(Self::NoData),
            "ABORTED" => Ok(Self::Aborted),
            "CORRUPTED" => Ok(Self::Corrupted),
            other => Err(ScanError::UnknownStatus(other.to_string())),
        }
    }
}

/// Multichannel analyser layout of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct McaParams {
    /// Counts written per text line
    pub columns_per_line: usize,
    /// Number of channels per spectrum
    pub channels: usize,
    /// First channel index
    pub start: i64,
    /// Last channel index
    pub stop: i64,
}

impl McaParams {
    /// Number of text lines one spectrum occupies
    #[must_use]
    pub fn lines_per_record(&self) -> usize {
        if self.columns_per_line == 0 {
            return 1;
        }
        self.channels.div_ceil(self.columns_per_line).max(1)
    }
}

/// Position of a scan inside its raw file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLocation {
    /// Raw file holding the scan
    pub file: PathBuf,
    /// Byte offset of the scan header
    pub header_offset: u64,
    /// Byte offset of the first data line, if any
    pub data_offset: Option<u64>,
}

/// Header information of a scan
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanMeta {
    /// Scan number
    pub number: ScanNumber,
    /// Command that started the scan
    pub command: String,
    /// Date string as written in the header
    pub date: String,
    /// Time of day (`hh:mm:ss`) extracted from the date line
    pub time: String,
    /// Parsed start time, when the date line follows the usual layout
    pub timestamp: Option<NaiveDateTime>,
    /// Integration time per point
    pub int_time: Option<f64>,
    /// Initial motor positions by motor name
    pub init_motors: IndexMap<String, f64>,
    /// Names of the data columns
    pub column_names: Vec<String>,
    /// Acquisition status
    pub status: ScanStatus,
    /// MCA layout, if the scan records spectra
    pub mca: Option<McaParams>,
    /// Location in the raw file
    pub location: Option<RawLocation>,
}

impl ScanMeta {
    /// Create metadata with number and command, everything else empty
    #[must_use]
    pub fn new(number: ScanNumber, command: impl Into<String>) -> Self {
        Self {
            number,
            command: command.into(),
            ..Self::default()
        }
    }

    /// Group-style name of the scan, e.g. `scan_12`
    #[must_use]
    pub fn name(&self) -> String {
        format!("scan_{}", self.number)
    }

    /// Initial position of a motor
    #[must_use]
    pub fn motor(&self, name: &str) -> Option<f64> {
        self.init_motors.get(name).copied()
    }
}

/// Single recorded measurement with lazily loaded data
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    meta: ScanMeta,
    data: Option<ScanData>,
}

impl Scan {
    /// Create scan without data
    #[inline]
    #[must_use]
    pub fn new(meta: ScanMeta) -> Self {
        Self { meta, data: None }
    }

    /// Scan number
    #[inline]
    #[must_use]
    pub fn number(&self) -> ScanNumber {
        self.meta.number
    }

    /// Current acquisition status
    #[inline]
    #[must_use]
    pub fn status(&self) -> ScanStatus {
        self.meta.status
    }

    /// Header metadata
    #[inline]
    #[must_use]
    pub fn meta(&self) -> &ScanMeta {
        &self.meta
    }

    /// Replace the metadata, keeping loaded data
    pub fn set_meta(&mut self, meta: ScanMeta) {
        self.meta = meta;
    }

    /// Update the status after reading the data block
    pub fn set_status(&mut self, status: ScanStatus) {
        self.meta.status = status;
    }

    /// Data if loaded
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&ScanData> {
        self.data.as_ref()
    }

    /// Whether data is currently held in memory
    #[inline]
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Hold data in memory
    pub fn set_data(&mut self, data: ScanData) {
        self.data = Some(data);
    }

    /// Move the data out, leaving the scan empty
    pub fn take_data(&mut self) -> Option<ScanData> {
        self.data.take()
    }

    /// Drop the data to free memory
    pub fn clear_data(&mut self) {
        self.data = None;
    }
}
