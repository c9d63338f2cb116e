//! evaldata scan sources
//!
//! Reads experimental scans from raw files and keeps a NeXus cache next to
//! them, so repeated access skips parsing:
//! - Raw readers for SPEC files, PAL-XFEL folders and existing containers
//! - Mapping between scans and the cache layout
//! - [`Source`], which decides what to parse, what to read from the cache
//!   and what to write back
//!
//! # Example
//!
//! ```rust,no_run
//! use evaldata_io::{Source, SourceConfig};
//!
//! # fn example() -> Result<(), evaldata_io::SourceError> {
//! let config = SourceConfig::new("run.spec", "/beamtime/data").with_read_and_forget(true);
//! let mut source = Source::new(config)?;
//!
//! for number in source.scan_numbers() {
//!     let data = source.get_scan_data(number, true)?;
//!     println!("#{number}: {} points", data.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod mapping;
pub mod readers;
pub mod source;

pub use config::{PalXfelOptions, SourceConfig, DEFAULT_NEXUS_POSTFIX};
pub use error::{ConfigError, ParseError, SourceError, SourceResult};
pub use readers::{
    default_readers, DataBlock, FilePattern, NexusReader, NexusReaderFactory, PalXfelReader,
    PalXfelReaderFactory, RawReader, ReaderFactory, ReaderKind, ReaderRegistry, SpecReader,
    SpecReaderFactory,
};
pub use source::{Source, UpdateSummary};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with scan sources
    pub use crate::{ReaderKind, Source, SourceConfig, SourceError, SourceResult, UpdateSummary};
    pub use evaldata_scan::{Scan, ScanData, ScanMeta, ScanNumber, ScanStatus};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
