//! Raw scan readers
//!
//! A [`RawReader`] turns one raw source into scan metadata and reads the
//! data block of a scan on demand:
//! - SPEC text files ([`SpecReader`])
//! - PAL-XFEL folders of per-scan files ([`PalXfelReader`])
//! - existing cache containers used as input ([`NexusReader`])
//!
//! Readers are created through a [`ReaderRegistry`] that picks the factory
//! matching the raw path.

use crate::config::SourceConfig;
use crate::error::ParseError;
use evaldata_scan::{Fingerprint, ScanData, ScanMeta, ScanStatus};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::FromStr;

mod data;
mod header;
mod nexus;
mod palxfel;
mod spec;

pub use data::parse_numbers;
pub use nexus::{NexusReader, NexusReaderFactory};
pub use palxfel::{FilePattern, PalXfelReader, PalXfelReaderFactory};
pub use spec::{SpecReader, SpecReaderFactory};

/// Kind of raw source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderKind {
    /// Single SPEC text file
    Spec,
    /// Folder of PAL-XFEL `*_meta.log` files
    PalXfel,
    /// NeXus container in evaldata layout
    Nexus,
}

impl ReaderKind {
    /// Canonical name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spec => "spec",
            Self::PalXfel => "pal_xfel",
            Self::Nexus => "nexus",
        }
    }
}

impl Display for ReaderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReaderKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "spec" => Ok(Self::Spec),
            "pal_xfel" | "palxfel" | "pal" => Ok(Self::PalXfel),
            "nexus" | "nxs" => Ok(Self::Nexus),
            _ => Err(ParseError::NoReaderForPath(s.into())),
        }
    }
}

/// Data block of one scan as read from its source
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    /// Status after reading, e.g. `ABORTED` for an abort notice
    pub status: ScanStatus,
    /// Column data; `None` when the scan holds no usable data
    pub data: Option<ScanData>,
}

impl DataBlock {
    /// Block without data
    #[must_use]
    pub fn empty(status: ScanStatus) -> Self {
        Self { status, data: None }
    }
}

/// Reader of one raw source
///
/// Implement this trait to add a new raw format.
pub trait RawReader: Send + Sync + fmt::Debug {
    /// Kind of source this reader handles
    fn kind(&self) -> ReaderKind;

    /// Raw file or folder
    fn raw_path(&self) -> &Path;

    /// Cheap fingerprint that changes whenever the raw data changes
    ///
    /// # Errors
    /// Returns error if the raw source cannot be inspected
    fn fingerprint(&self) -> Result<Fingerprint, ParseError>;

    /// Parse scan headers
    ///
    /// Incremental: returns scans that are new or may have changed since the
    /// previous call. The last scan seen is always reported again.
    ///
    /// # Errors
    /// Returns error if the raw source cannot be read or is malformed
    fn parse(&mut self) -> Result<Vec<ScanMeta>, ParseError>;

    /// Read the data block of a scan
    ///
    /// # Errors
    /// Returns error if the raw file cannot be read
    fn read_data(&self, meta: &ScanMeta) -> Result<DataBlock, ParseError>;

    /// Forget parse progress; the next [`parse`](Self::parse) starts over
    fn reset(&mut self);

    /// Whether a companion cache makes sense for this source
    fn supports_cache(&self) -> bool {
        true
    }
}

/// Creates readers for paths it recognizes
pub trait ReaderFactory: Send + Sync {
    /// Kind of reader produced
    fn kind(&self) -> ReaderKind;

    /// Check if this factory handles the given raw path
    fn can_read(&self, path: &Path) -> bool;

    /// Factory priority (higher = tried first when multiple factories match)
    fn priority(&self) -> i32 {
        0
    }

    /// Create a reader for the configured source
    ///
    /// # Errors
    /// Returns error if the configuration cannot be served by this reader
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn RawReader>, ParseError>;
}

/// Registry of reader factories
pub struct ReaderRegistry {
    factories: Vec<Box<dyn ReaderFactory>>,
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ReaderRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Register a factory
    pub fn register<F: ReaderFactory + 'static>(&mut self, factory: F) {
        self.factories.push(Box::new(factory));
        self.factories
            .sort_by_key(|f| std::cmp::Reverse(f.priority()));
    }

    /// Find factory for path
    #[must_use]
    pub fn find_for_path(&self, path: &Path) -> Option<&dyn ReaderFactory> {
        self.factories
            .iter()
            .find(|f| f.can_read(path))
            .map(|f| &**f)
    }

    /// Find factory by kind
    #[must_use]
    pub fn find_kind(&self, kind: ReaderKind) -> Option<&dyn ReaderFactory> {
        self.factories
            .iter()
            .find(|f| f.kind() == kind)
            .map(|f| &**f)
    }

    /// Registered kinds, highest priority first
    #[must_use]
    pub fn kinds(&self) -> Vec<ReaderKind> {
        self.factories.iter().map(|f| f.kind()).collect()
    }

    /// Create the reader for a configuration
    ///
    /// A reader forced in the configuration wins over path detection.
    ///
    /// # Errors
    /// Returns [`ParseError::NoReaderForPath`] if no factory matches
    pub fn create(&self, config: &SourceConfig) -> Result<Box<dyn RawReader>, ParseError> {
        let path = config.raw_path();
        let factory = match config.reader {
            Some(kind) => self.find_kind(kind),
            None => self.find_for_path(&path),
        }
        .ok_or_else(|| ParseError::NoReaderForPath(path.clone()))?;

        tracing::debug!("Using {} reader for {}", factory.kind(), path.display());
        factory.create(config)
    }
}

/// Create default registry with the built-in readers
#[inline]
#[must_use]
pub fn default_readers() -> ReaderRegistry {
    let mut registry = ReaderRegistry::new();
    registry.register(SpecReaderFactory);
    registry.register(PalXfelReaderFactory);
    registry.register(NexusReaderFactory);
    registry
}
