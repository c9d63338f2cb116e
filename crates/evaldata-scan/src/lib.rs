//! evaldata scan model
//!
//! Typed representation of a single recorded measurement ("scan") and the
//! primitives shared by every reader and cache backend.
//!
//! # Core Concepts
//!
//! - [`Scan`]: metadata plus lazily loaded data
//! - [`ScanMeta`]: header information parsed from the raw file
//! - [`ScanData`]: named numeric columns, optionally with MCA spectra
//! - [`Fingerprint`]: 32-byte Blake3 digest used to detect raw file changes
//!
//! # Example
//!
//! ```rust
//! use evaldata_scan::{Scan, ScanData, ScanMeta};
//!
//! let meta = ScanMeta::new(1, "ascan th 0 1 10 1");
//! let mut scan = Scan::new(meta);
//!
//! let data = ScanData::from_records(
//!     vec!["th".into(), "det".into()],
//!     vec![vec![0.0, 10.0], vec![0.1, 12.0]],
//! )
//! .unwrap();
//! scan.set_data(data);
//!
//! assert_eq!(scan.data().unwrap()["det"][1], 12.0);
//! ```

#![warn(unreachable_pub)]

mod data;
mod error;
mod hash;
mod scan;

pub use data::{McaSpectra, Rows, ScanData};
pub use error::{HashError, ScanError};
pub use hash::Fingerprint;
pub use scan::{McaParams, RawLocation, Scan, ScanMeta, ScanNumber, ScanStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
