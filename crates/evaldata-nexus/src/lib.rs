//! evaldata NeXus containers
//!
//! A cache file consolidates every scan of a source into one NeXus-structured
//! container. This crate knows nothing about scans: it models the container
//! as a tree of groups, attributes and numeric datasets, and persists that
//! tree through a [`ContainerBackend`].
//!
//! # Layout
//!
//! ```text
//! NxFile (NXroot attrs)
//!  ├── entry1  (NXentry)
//!  │    ├── init_mopo (NXcollection)
//!  │    └── data      (NXdata)  delay, Monitor, Detector, ...
//!  └── entry2  (NXentry)
//! ```
//!
//! # Backends
//!
//! - [`JsonBackend`]: gzip-compressed JSON document, always available
//! - `Hdf5Backend`: native HDF5 file, behind the `hdf5` feature

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod backend;
pub mod error;
#[cfg(feature = "hdf5")]
pub mod h5;
pub mod json;
pub mod store;
pub mod tree;

pub use backend::{ContainerBackend, ContainerFormat, ReadDepth};
pub use error::{NexusError, NexusResult};
#[cfg(feature = "hdf5")]
pub use h5::Hdf5Backend;
pub use json::JsonBackend;
pub use store::NexusStore;
pub use tree::{AttrValue, Attributes, NxDataset, NxFile, NxGroup};

/// NX_class attribute name
pub const NX_CLASS: &str = "NX_class";
